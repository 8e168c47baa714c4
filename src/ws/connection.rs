#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::config::Settings;
use super::error::WsError;
use super::tls::TrustStore;
use super::traits::{DialRequest, FrameSink, Transport};
use crate::Result;

/// Upper bound on sending the close frame of a handle being released.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, or the connection was closed locally
    Disconnected,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Recovering from a reconnectable fault
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    #[must_use]
    pub const fn is_reconnecting(self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

/// Send half of the live connection. Only reachable through the link lock.
pub(crate) struct Link<S> {
    pub(crate) sink: S,
    pub(crate) generation: u64,
    shutdown: CancellationToken,
}

/// Receive half of the live connection, shared with readers by reference count.
pub(crate) struct Reader<S> {
    pub(crate) stream: Arc<Mutex<S>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) generation: u64,
}

impl<S> Clone for Reader<S> {
    fn clone(&self) -> Self {
        Self {
            stream: Arc::clone(&self.stream),
            shutdown: self.shutdown.clone(),
            generation: self.generation,
        }
    }
}

/// Owns the single transport connection of a client, plus what is needed to
/// dial it again: endpoint settings and the trust store.
///
/// At most one handle is held at a time. Installing a new one always releases
/// the previous one first.
pub(crate) struct Holder<T: Transport> {
    transport: T,
    settings: RwLock<Settings>,
    trust_store: TrustStore,
    /// Serializes every send and every dial/replace/init sequence.
    link: Mutex<Option<Link<T::Sink>>>,
    reader: RwLock<Option<Reader<T::Stream>>>,
    /// Generation of the most recently installed handle; 0 before the first.
    generation: AtomicU64,
}

impl<T: Transport> Holder<T> {
    pub(crate) fn new(transport: T, settings: Settings) -> Self {
        Self {
            transport,
            settings: RwLock::new(settings),
            trust_store: TrustStore::new(),
            link: Mutex::new(None),
            reader: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    // Settings carry no cross-field invariants, so a poisoned lock is safe to reuse.
    pub(crate) fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn update_settings<F: FnOnce(&mut Settings)>(&self, update: F) {
        update(&mut self.settings.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) async fn lock_link(&self) -> MutexGuard<'_, Option<Link<T::Sink>>> {
        self.link.lock().await
    }

    pub(crate) fn reader(&self) -> Option<Reader<T::Stream>> {
        self.reader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dial_request(&self, settings: &Settings) -> Result<DialRequest> {
        let mut request = DialRequest::new(settings.url.clone());
        if settings.secure {
            request = request.with_tls(self.trust_store.client_config()?);
        }
        if let Some(handler) = &settings.close_handler {
            request = request.with_close_handler(Arc::clone(handler));
        }
        Ok(request)
    }

    /// Dials a new connection, delivers the initialization message on it and
    /// installs it in place of the current one.
    ///
    /// On any failure the current handle is left untouched.
    pub(crate) async fn connect(&self, link: &mut Option<Link<T::Sink>>) -> Result<u64> {
        let settings = self.settings();
        let request = self.dial_request(&settings)?;

        let (mut sink, stream) = self
            .transport
            .dial(&request)
            .await
            .map_err(WsError::Dial)?;

        if let Some(init) = settings.init_message {
            if let Err(e) = sink.send_frame(init).await {
                close_quietly(&mut sink).await;
                return Err(WsError::InitMessage(e).into());
            }
        }

        if let Some(mut previous) = link.take() {
            previous.shutdown.cancel();
            close_quietly(&mut previous.sink).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shutdown = CancellationToken::new();

        *self.reader.write().unwrap_or_else(PoisonError::into_inner) = Some(Reader {
            stream: Arc::new(Mutex::new(stream)),
            shutdown: shutdown.clone(),
            generation,
        });
        *link = Some(Link {
            sink,
            generation,
            shutdown,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %request.url, generation, "Connection installed");

        Ok(generation)
    }

    /// Releases the current handle, if any. Pending reads are woken up.
    pub(crate) async fn disconnect(&self, link: &mut Option<Link<T::Sink>>) {
        self.reader
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut current) = link.take() {
            current.shutdown.cancel();
            close_quietly(&mut current.sink).await;
        }
    }
}

/// Best-effort close: faults are logged, never propagated.
async fn close_quietly<S: FrameSink>(sink: &mut S) {
    match timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Close frame not delivered");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
        Err(_elapsed) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Timed out closing connection");
        }
    }
}

