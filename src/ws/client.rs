use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

use super::config::{CloseHandler, Config, Endpoint, Settings};
use super::connection::{ConnectionState, Holder, Link};
use super::error::{TransportError, WsError};
use super::frame::Frame;
use super::queue::{self, WriteQueue};
use super::tls::TrustStore;
use super::traits::{FrameSink as _, FrameStream as _, Transport};
use super::transport::TungsteniteTransport;
use crate::Result;
use crate::error::{Error, Kind};

/// Storm guard for automatic reconnection.
#[derive(Debug, Default)]
struct ReconnectState {
    in_progress: AtomicBool,
    last_attempt: std::sync::Mutex<Option<Instant>>,
}

impl ReconnectState {
    /// Claims the right to run a recovery episode. Fails if one is running.
    fn begin(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Marks an episode as running, whether or not it was claimed already.
    fn resume(&self) {
        self.in_progress.store(true, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn record_attempt(&self) {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Time left before the next attempt may start.
    fn until_next_attempt(&self, spacing: Duration) -> Duration {
        self.last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(Duration::ZERO, |last| {
                (last + spacing).saturating_duration_since(Instant::now())
            })
    }
}

struct ClientInner<T: Transport> {
    holder: Holder<T>,
    reconnect: ReconnectState,
    state_tx: watch::Sender<ConnectionState>,
    /// Latest generation reported as faulted; wakes the recovery task.
    recovery_tx: OnceLock<watch::Sender<u64>>,
}

/// WebSocket client that keeps one logical connection alive across faults.
///
/// All clones share the same connection. Sends are serialized, reads may run
/// concurrently with sends, and at most one read should be pending at a time.
///
/// When reconnection is enabled, a closure with a normal, going-away or
/// abnormal code, or any network fault, starts a background recovery that
/// redials with a fixed delay until it succeeds. The call that observed the
/// fault still gets it back immediately.
///
/// # Example
///
/// ```rust, no_run
/// use resilient_ws::ws::{Client, Config, Frame};
///
/// #[tokio::main]
/// async fn main() -> resilient_ws::Result<()> {
///     let mut config = Config::default();
///     config.reconnect = true;
///
///     let client = Client::new("ws://127.0.0.1:9001/feed", config)?;
///     client.set_init_message(Frame::text(r#"{"op":"subscribe"}"#));
///     client.connect().await?;
///
///     loop {
///         match client.read().await {
///             Ok(frame) => println!("{:?}", frame.as_text()),
///             Err(e) if e.is_reconnectable() => continue,
///             Err(e) => return Err(e),
///         }
///     }
/// }
/// ```
pub struct Client<T: Transport = TungsteniteTransport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Client<TungsteniteTransport> {
    /// Create a client for `endpoint` backed by `tokio-tungstenite`.
    ///
    /// No connection is made until [`Client::connect`] or the first read/write.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_transport(TungsteniteTransport, endpoint, config)
    }
}

impl<T: Transport> Client<T> {
    /// Create a client that dials through a custom [`Transport`].
    pub fn with_transport(transport: T, endpoint: &str, config: Config) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(ClientInner {
                holder: Holder::new(transport, Settings::new(url, config)),
                reconnect: ReconnectState::default(),
                state_tx,
                recovery_tx: OnceLock::new(),
            }),
        })
    }

    /// Establish a new connection, replacing (and closing) the current one.
    ///
    /// The initialization message, if set, is sent before any other traffic.
    /// Concurrent calls are serialized; on failure the current connection is
    /// kept.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.inner.holder.lock_link().await;
        self.connect_locked(&mut link).await
    }

    async fn connect_locked(&self, link: &mut Option<Link<T::Sink>>) -> Result<()> {
        self.inner.reconnect.record_attempt();
        let generation = self.inner.holder.connect(link).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(generation, "WebSocket connected");
        #[cfg(not(feature = "tracing"))]
        let _ = generation;

        self.inner.state_tx.send_replace(ConnectionState::Connected {
            since: Instant::now(),
        });
        Ok(())
    }

    /// Dial on demand when no connection is held.
    async fn connect_if_absent(&self, link: &mut Option<Link<T::Sink>>) -> Result<()> {
        if link.is_some() {
            return Ok(());
        }
        self.connect_locked(link).await.map_err(|e| {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "On-demand connect failed");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            Error::from(WsError::NotConnected)
        })
    }

    /// Close the connection, sending a close frame on a best-effort basis.
    ///
    /// Closing a client without a connection is a no-op. A pending
    /// [`Client::read`] returns with a [`Kind::NotConnected`] fault.
    pub async fn close(&self) -> Result<()> {
        let mut link = self.inner.holder.lock_link().await;
        self.inner.holder.disconnect(&mut link).await;
        self.inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
        Ok(())
    }

    /// Read the next data frame.
    ///
    /// Dials first if no connection is held; if that fails, returns a
    /// [`Kind::NotConnected`] fault.
    pub async fn read(&self) -> Result<Frame> {
        let reader = match self.inner.holder.reader() {
            Some(reader) => reader,
            None => {
                let mut link = self.inner.holder.lock_link().await;
                self.connect_if_absent(&mut link).await?;
                drop(link);
                self.inner.holder.reader().ok_or(WsError::NotConnected)?
            }
        };

        let mut stream = reader.stream.lock().await;
        let result = tokio::select! {
            biased;
            () = reader.shutdown.cancelled() => return Err(WsError::ConnectionClosed.into()),
            result = stream.receive_frame() => result,
        };
        drop(stream);

        result.map_err(|e| self.fault(e, reader.generation))
    }

    /// Read the next frame and decode it as JSON.
    ///
    /// A payload that does not decode is a [`Kind::Terminal`] fault and leaves
    /// the connection as is.
    pub async fn read_json<R: DeserializeOwned>(&self) -> Result<R> {
        let frame = self.read().await?;
        serde_json::from_slice(&frame.payload).map_err(|e| WsError::MessageParse(e).into())
    }

    /// Send one frame. At most one send is in flight at any time.
    pub async fn write_message(&self, frame: Frame) -> Result<()> {
        frame.validate()?;

        let mut link = self.inner.holder.lock_link().await;
        self.connect_if_absent(&mut link).await?;
        let Some(active) = link.as_mut() else {
            return Err(WsError::NotConnected.into());
        };

        let generation = active.generation;
        let result = active.sink.send_frame(frame).await;
        drop(link);

        result.map_err(|e| self.fault(e, generation))
    }

    /// Serialize `value` as JSON and send it as a text frame.
    pub async fn write_json<R: Serialize>(&self, value: &R) -> Result<()> {
        let json =
            serde_json::to_string(value).map_err(|e| Error::with_source(Kind::Validation, e))?;
        self.write_message(Frame::text(json)).await
    }

    /// Spawn the write-queue worker: frames pushed to `queue` are delivered in
    /// order through [`Client::write_message`], and delivery faults are offered
    /// to `faults` without blocking.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start_write_queue(
        &self,
        queue: WriteQueue,
        faults: mpsc::Sender<Error>,
    ) -> JoinHandle<()> {
        let retry_delay = self.inner.holder.settings().write_retry_delay;
        tokio::spawn(queue::run(self.clone(), queue, faults, retry_delay))
    }

    /// Classify a transport fault and start recovery if policy allows it.
    fn fault(&self, error: TransportError, generation: u64) -> Error {
        let error = WsError::Transport(error);
        if error.kind() == Kind::Reconnectable {
            self.schedule_recovery(generation);
        }
        error.into()
    }

    fn schedule_recovery(&self, generation: u64) {
        if !self.inner.holder.settings().reconnect {
            return;
        }
        // The handle that faulted was already replaced.
        if generation != self.inner.holder.generation() {
            return;
        }
        if self.inner.reconnect.begin() {
            self.inner
                .state_tx
                .send_replace(ConnectionState::Reconnecting { attempt: 1 });
        } else {
            #[cfg(feature = "tracing")]
            tracing::trace!(generation, "Reconnect already in progress");
        }

        // Only the latest faulted generation is kept. Faults raised during an
        // episode collapse into one pending wake-up, which the supervisor drops
        // if that episode replaced the handle.
        let tx = self.inner.recovery_tx.get_or_init(|| {
            let (tx, rx) = watch::channel(generation);
            tokio::spawn(supervise(Arc::downgrade(&self.inner), rx));
            tx
        });
        tx.send_replace(generation);
    }

    /// One reconnect attempt against the handle of generation `stale`.
    ///
    /// Returns `Ok(false)` when that handle is gone already: closed, or
    /// replaced by another connect.
    async fn reconnect_once(&self, stale: u64, attempt: u32) -> Result<bool> {
        let mut link = self.inner.holder.lock_link().await;
        match link.as_ref() {
            None => {
                self.inner
                    .state_tx
                    .send_replace(ConnectionState::Disconnected);
                return Ok(false);
            }
            Some(current) if current.generation != stale => return Ok(false),
            Some(_) => {}
        }

        self.inner
            .state_tx
            .send_replace(ConnectionState::Reconnecting { attempt });
        self.connect_locked(&mut link).await?;
        Ok(true)
    }

    /// Sets the endpoint used by subsequent connects.
    pub fn set_endpoint(&self, scheme: &str, host: &str, path: &str) -> Result<()> {
        let url = Endpoint::new(scheme, host, path).to_url()?;
        self.inner
            .holder
            .update_settings(|settings| settings.url = url);
        Ok(())
    }

    /// Dial with a TLS configuration built from [`Client::trust_store`].
    pub fn set_secure(&self, secure: bool) {
        self.inner
            .holder
            .update_settings(|settings| settings.secure = secure);
    }

    /// Enable or disable automatic reconnection.
    ///
    /// Disabling it stops a running recovery after its current attempt.
    pub fn set_reconnect_enabled(&self, enabled: bool) {
        self.inner
            .holder
            .update_settings(|settings| settings.reconnect = enabled);
    }

    /// Frame sent as the very first message on every new connection.
    pub fn set_init_message(&self, frame: Frame) {
        self.inner
            .holder
            .update_settings(|settings| settings.init_message = Some(frame));
    }

    pub fn clear_init_message(&self) {
        self.inner
            .holder
            .update_settings(|settings| settings.init_message = None);
    }

    /// Callback registered on every subsequent connection, invoked with the
    /// close code and reason when the remote end closes it.
    pub fn set_close_handler<F>(&self, handler: F)
    where
        F: Fn(u16, &str) -> Result<()> + Send + Sync + 'static,
    {
        let handler: CloseHandler = Arc::new(handler);
        self.inner
            .holder
            .update_settings(|settings| settings.close_handler = Some(handler));
    }

    /// Add PEM-encoded root certificates for secure dials. Returns whether at
    /// least one certificate was accepted.
    pub fn append_trusted_certificate(&self, pem: &[u8]) -> bool {
        self.inner.holder.trust_store().append_pem(pem)
    }

    #[must_use]
    pub fn trust_store(&self) -> &TrustStore {
        self.inner.holder.trust_store()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether a background recovery is running.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnect.is_active()
    }
}

/// Recovery task: one per client, alive as long as the client is.
async fn supervise<T: Transport>(
    inner: Weak<ClientInner<T>>,
    mut triggers: watch::Receiver<u64>,
) {
    while triggers.changed().await.is_ok() {
        let stale = *triggers.borrow_and_update();
        let Some(strong) = inner.upgrade() else {
            return;
        };
        // Replaced before recovery started, e.g. by a manual connect.
        if strong.holder.generation() != stale {
            strong.reconnect.finish();
            continue;
        }
        strong.reconnect.resume();
        drop(strong);

        recover(&inner, stale).await;
    }
}

/// Redials until a connection replaces the handle of generation `stale`, the
/// handle is closed or replaced elsewhere, or reconnection is disabled.
async fn recover<T: Transport>(inner: &Weak<ClientInner<T>>, stale: u64) {
    let mut attempt = 0_u32;

    loop {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let client = Client { inner: strong };
        let settings = client.inner.holder.settings();

        if !settings.reconnect {
            #[cfg(feature = "tracing")]
            tracing::info!(attempt, "Reconnection disabled, giving up");
            client
                .inner
                .state_tx
                .send_replace(ConnectionState::Disconnected);
            break;
        }

        let wait = client
            .inner
            .reconnect
            .until_next_attempt(settings.reconnect_delay);
        if !wait.is_zero() {
            drop(client);
            sleep(wait).await;
            continue;
        }

        attempt = attempt.saturating_add(1);
        match client.reconnect_once(stale, attempt).await {
            Ok(true) => {
                #[cfg(feature = "tracing")]
                tracing::info!(attempt, "Reconnected");
                break;
            }
            Ok(false) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "Connection closed or replaced, stopping recovery");
                break;
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }

    if let Some(strong) = inner.upgrade() {
        strong.reconnect.finish();
    }
}
