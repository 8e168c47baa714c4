//! Resilient echo session.
//!
//! Connects to an echo endpoint, subscribes with an initialization message and
//! keeps writing through a bounded write queue while printing whatever comes
//! back. Kill and restart the server to watch the client recover and replay
//! its subscription.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,resilient_ws=debug cargo run --example echo --features tracing -- ws://127.0.0.1:9001
//! ```

use std::time::Duration;

use resilient_ws::ws::{Client, Config, Frame, WriteQueue};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_owned());

    let mut config = Config::default();
    config.reconnect = true;
    config.reconnect_delay = Duration::from_secs(2);

    let client = Client::new(&endpoint, config)?;
    client.set_init_message(Frame::text(r#"{"op":"subscribe","channel":"echo"}"#));
    client.set_close_handler(|code, reason| {
        info!(code, reason, "Server closed the connection");
        Ok(())
    });
    client.connect().await?;
    info!(%endpoint, state = ?client.state(), "Connected");

    let queue = WriteQueue::bounded(32);
    let (faults_tx, mut faults_rx) = mpsc::channel(8);
    let _worker = client.start_write_queue(queue.clone(), faults_tx);

    tokio::spawn(async move {
        while let Some(fault) = faults_rx.recv().await {
            warn!(error = %fault, "Write failed, frame requeued");
        }
    });

    let producer = queue.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        for seq in 0_u64.. {
            ticker.tick().await;
            if let Some(dropped) = producer.push(Frame::text(format!(r#"{{"seq":{seq}}}"#))) {
                warn!(bytes = dropped.payload.len(), "Queue full, oldest frame dropped");
            }
        }
    });

    loop {
        match client.read().await {
            Ok(frame) => info!(payload = ?frame.as_text(), "Received"),
            Err(e) if e.is_reconnectable() => {
                warn!(error = %e, "Connection lost, recovering");
                let mut state = client.state_receiver();
                state.wait_for(|s| s.is_connected()).await?;
                info!("Recovered");
            }
            Err(e) => {
                warn!(error = %e, "Read failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
