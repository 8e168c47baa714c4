//! Message frames exchanged with the remote endpoint.

use crate::Result;
use crate::error::Error;

/// Payload type of a data frame.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text frame
    Text,
    /// Opaque binary frame
    Binary,
}

/// One data frame, as read from or written to the connection.
///
/// Control frames (ping, pong, close) are handled by the transport and never
/// appear here.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    #[must_use]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::new(MessageKind::Text, text.into().into_bytes())
    }

    #[must_use]
    pub fn binary<B: Into<Vec<u8>>>(payload: B) -> Self {
        Self::new(MessageKind::Binary, payload.into())
    }

    /// Returns the payload as text if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Rejects text frames whose payload is not UTF-8.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.kind == MessageKind::Text && self.as_text().is_none() {
            return Err(Error::validation("text frame payload is not valid UTF-8"));
        }
        Ok(())
    }
}
