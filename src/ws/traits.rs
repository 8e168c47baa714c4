//! Seams to the transport collaborator.
//!
//! The lifecycle controller only needs three things from a WebSocket stack: a
//! way to dial, a send half and a receive half. [`TungsteniteTransport`] is the
//! production implementation; tests substitute scripted stubs.
//!
//! [`TungsteniteTransport`]: super::transport::TungsteniteTransport

use std::sync::Arc;

use async_trait::async_trait;
use rustls::ClientConfig;
use url::Url;

use super::config::CloseHandler;
use super::error::TransportError;
use super::frame::Frame;

/// Everything a transport needs to open one connection.
#[non_exhaustive]
#[derive(Clone)]
pub struct DialRequest {
    pub url: Url,
    /// TLS configuration to present; `None` lets the transport pick its default
    pub tls: Option<Arc<ClientConfig>>,
    /// Callback to register on the new connection for remote closures
    pub close_handler: Option<CloseHandler>,
}

impl DialRequest {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            tls: None,
            close_handler: None,
        }
    }

    #[must_use]
    pub fn with_tls(mut self, tls: Arc<ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn with_close_handler(mut self, handler: CloseHandler) -> Self {
        self.close_handler = Some(handler);
        self
    }

    /// Invokes the registered close handler, if any.
    ///
    /// Transports call this when they observe a close frame, before reporting
    /// [`TransportError::Closed`] to the reader.
    pub fn notify_close(handler: Option<&CloseHandler>, code: u16, reason: &str) {
        let Some(handler) = handler else {
            return;
        };
        if let Err(e) = handler(code, reason) {
            #[cfg(feature = "tracing")]
            tracing::warn!(code, reason, error = %e, "Close handler failed");
            #[cfg(not(feature = "tracing"))]
            let _: &crate::error::Error = &e;
        }
    }
}

/// Dials new connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Sink: FrameSink;
    type Stream: FrameStream;

    /// Opens a connection and returns its send and receive halves.
    ///
    /// The close handler in `request` must already be registered on the
    /// returned stream.
    async fn dial(&self, request: &DialRequest)
    -> Result<(Self::Sink, Self::Stream), TransportError>;
}

/// Send half of a connection. Never used by more than one task at a time.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Sends a close frame and releases the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Receive half of a connection.
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Waits for the next data frame. Control frames are consumed internally.
    async fn receive_frame(&mut self) -> Result<Frame, TransportError>;
}
