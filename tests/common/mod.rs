#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Each test binary uses a different subset of the helpers"
)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use resilient_ws::ws::{
    CloseHandler, Config, DialRequest, Frame, FrameSink, FrameStream, Transport, TransportError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const ENDPOINT: &str = "ws://stub.invalid/feed";

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Config with short delays so recovery tests run quickly.
#[must_use]
pub fn fast_config(reconnect: bool) -> Config {
    let mut config = Config::default();
    config.reconnect = reconnect;
    config.reconnect_delay = Duration::from_millis(50);
    config.write_retry_delay = Duration::from_millis(10);
    config
}

/// What the stub transport has been asked to do so far, and how it should
/// behave next.
#[derive(Default)]
pub struct StubState {
    dials: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    failures_left: AtomicUsize,
    fail_sends: AtomicBool,
    dial_delay: Mutex<Duration>,
    dialed: Mutex<Vec<String>>,
}

impl StubState {
    #[must_use]
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Every URL dialed so far, in order.
    #[must_use]
    pub fn dialed_urls(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }

    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Make the next `count` dials fail with a refused connection.
    pub fn fail_next_dials(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Make every send fail with a broken pipe until switched off.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_dial_delay(&self, delay: Duration) {
        *self.dial_delay.lock().unwrap() = delay;
    }
}

/// Server side of one stub connection.
pub struct Peer {
    /// Frames the client sent on this connection, in order
    pub sent: mpsc::UnboundedReceiver<Frame>,
    /// Feed frames or faults to the client's reader
    pub inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    /// Whether the client released this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn next_sent(&mut self) -> Frame {
        timeout(WAIT, self.sent.recv()).await.unwrap().unwrap()
    }

    pub fn push(&self, frame: Frame) {
        self.inbound.send(Ok(frame)).unwrap();
    }

    pub fn fault(&self, error: TransportError) {
        self.inbound.send(Err(error)).unwrap();
    }
}

/// Test-side handle on a [`StubTransport`].
pub struct StubControl {
    pub state: Arc<StubState>,
    peers: mpsc::UnboundedReceiver<Peer>,
}

impl StubControl {
    /// Wait for the next successful dial.
    pub async fn next_peer(&mut self) -> Peer {
        timeout(WAIT, self.peers.recv()).await.unwrap().unwrap()
    }

    /// A peer that already connected, without waiting.
    pub fn try_next_peer(&mut self) -> Option<Peer> {
        self.peers.try_recv().ok()
    }
}

/// In-memory [`Transport`] driven entirely by the test.
pub struct StubTransport {
    state: Arc<StubState>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl StubTransport {
    #[must_use]
    pub fn new() -> (Self, StubControl) {
        let state = Arc::new(StubState::default());
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::clone(&state),
                peers: peers_tx,
            },
            StubControl {
                state,
                peers: peers_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for StubTransport {
    type Sink = StubSink;
    type Stream = StubStream;

    async fn dial(
        &self,
        request: &DialRequest,
    ) -> Result<(Self::Sink, Self::Stream), TransportError> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        self.state
            .dialed
            .lock()
            .unwrap()
            .push(request.url.to_string());
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.state.dial_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let refused = self
            .state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        drop(self.peers.send(Peer {
            sent: sent_rx,
            inbound: inbound_tx,
            closed: Arc::clone(&closed),
        }));

        Ok((
            StubSink {
                sent: sent_tx,
                state: Arc::clone(&self.state),
                closed,
            },
            StubStream {
                inbound: inbound_rx,
                close_handler: request.close_handler.clone(),
            },
        ))
    }
}

pub struct StubSink {
    sent: mpsc::UnboundedSender<Frame>,
    state: Arc<StubState>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for StubSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        self.sent
            .send(frame)
            .map_err(|_unsent| TransportError::closed(1006, "peer gone"))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct StubStream {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    close_handler: Option<CloseHandler>,
}

#[async_trait]
impl FrameStream for StubStream {
    async fn receive_frame(&mut self) -> Result<Frame, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(TransportError::Closed { code, reason })) => {
                DialRequest::notify_close(self.close_handler.as_ref(), code, &reason);
                Err(TransportError::Closed { code, reason })
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::closed(1006, "peer gone")),
        }
    }
}
