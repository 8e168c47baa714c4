//! Self-healing WebSocket connection.
//!
//! # Architecture
//!
//! - [`Client`]: lifecycle controller. Connects, reads, writes, closes, and
//!   classifies faults to decide when to reconnect in the background
//! - `connection`: holds the single live handle and replaces it atomically
//! - [`WriteQueue`]: bounded outbound ring drained by a worker task started
//!   with [`Client::start_write_queue`]
//! - [`Transport`]: seam to the WebSocket stack; [`TungsteniteTransport`] is
//!   the production implementation
//!
//! # Example
//!
//! ```rust, no_run
//! use resilient_ws::ws::{Client, Config, Frame, WriteQueue};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> resilient_ws::Result<()> {
//! let client = Client::new("wss://example.com/feed", Config::default())?;
//! client.set_reconnect_enabled(true);
//!
//! let queue = WriteQueue::bounded(256);
//! let (faults_tx, mut faults_rx) = mpsc::channel(16);
//! client.start_write_queue(queue.clone(), faults_tx);
//!
//! queue.push(Frame::text("hello"));
//! if let Some(fault) = faults_rx.recv().await {
//!     eprintln!("delivery failed, will retry: {fault}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod queue;
pub mod tls;
pub mod traits;
pub mod transport;

pub use client::Client;
pub use config::{CloseHandler, Config, Endpoint};
pub use connection::ConnectionState;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use error::TransportError;
pub use frame::{Frame, MessageKind};
pub use queue::WriteQueue;
pub use tls::TrustStore;
pub use traits::*;
pub use transport::TungsteniteTransport;
