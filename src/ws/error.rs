#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::{fmt, io};

use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::error::ProtocolError;

use crate::error::{Error, Kind};

/// Close code sent on an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent by an endpoint that is going away (server restart, page navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code reported when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Fault reported by the transport collaborator.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportError {
    /// The connection was closed, with the close code and reason of the close frame
    Closed { code: u16, reason: String },
    /// Socket-level failure (reset, refused, timed out, broken pipe)
    Network(io::Error),
    /// Anything else: protocol violations, malformed frames, TLS setup
    Other(Box<dyn StdError + Send + Sync + 'static>),
}

impl TransportError {
    pub fn closed<S: Into<String>>(code: u16, reason: S) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }

    pub fn other<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Other(Box::new(error))
    }

    /// Whether this fault should trigger automatic reconnection.
    ///
    /// Closures with a normal, going-away or abnormal code qualify, as do all
    /// socket-level faults. Everything else is terminal.
    #[must_use]
    pub fn is_reconnectable(&self) -> bool {
        match self {
            Self::Closed { code, .. } => {
                matches!(*code, CLOSE_NORMAL | CLOSE_GOING_AWAY | CLOSE_ABNORMAL)
            }
            Self::Network(_) => true,
            Self::Other(_) => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed { code, reason } if reason.is_empty() => {
                write!(f, "connection closed with code {code}")
            }
            Self::Closed { code, reason } => {
                write!(f, "connection closed with code {code}: {reason}")
            }
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            Self::Other(e) => Some(e.as_ref()),
            Self::Closed { .. } => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Network(e)
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(e) => Self::Network(e),
            tungstenite::Error::ConnectionClosed => Self::closed(CLOSE_NORMAL, ""),
            tungstenite::Error::AlreadyClosed => {
                Self::closed(CLOSE_ABNORMAL, "connection already closed")
            }
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                Self::closed(CLOSE_ABNORMAL, "reset without closing handshake")
            }
            other => Self::other(other),
        }
    }
}

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Fault while sending or receiving on a live connection
    Transport(TransportError),
    /// Dialing the endpoint failed
    Dial(TransportError),
    /// The initialization message could not be delivered on a fresh connection
    InitMessage(TransportError),
    /// No connection is held and none could be established
    NotConnected,
    /// The connection was shut down locally while the operation was pending
    ConnectionClosed,
    /// Error parsing a WebSocket message
    MessageParse(serde_json::Error),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "WebSocket transport error: {e}"),
            Self::Dial(e) => write!(f, "WebSocket dial failed: {e}"),
            Self::InitMessage(e) => write!(f, "Failed to send initialization message: {e}"),
            Self::NotConnected => write!(f, "WebSocket is not connected"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transport(e) | Self::Dial(e) | Self::InitMessage(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

impl WsError {
    /// The [`Kind`] this variant is reported under.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Transport(e) if e.is_reconnectable() => Kind::Reconnectable,
            Self::Transport(_) | Self::MessageParse(_) => Kind::Terminal,
            Self::Dial(_) | Self::InitMessage(_) => Kind::Dial,
            Self::NotConnected | Self::ConnectionClosed => Kind::NotConnected,
        }
    }
}

// Integration with main Error type
impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::with_source(e.kind(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_closures_are_reconnectable() {
        for code in [CLOSE_NORMAL, CLOSE_GOING_AWAY, CLOSE_ABNORMAL] {
            assert!(
                TransportError::closed(code, "bye").is_reconnectable(),
                "code {code} should be reconnectable"
            );
        }
    }

    #[test]
    fn unexpected_closures_are_terminal() {
        for code in [CLOSE_NO_STATUS, 1002, 1003, 1008, 1011, 4000] {
            assert!(
                !TransportError::closed(code, "").is_reconnectable(),
                "code {code} should be terminal"
            );
        }
    }

    #[test]
    fn network_faults_are_reconnectable() {
        let err = TransportError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(err.is_reconnectable(), "reset should be reconnectable");

        let err: Error = WsError::Transport(err).into();
        assert_eq!(err.kind(), Kind::Reconnectable);
    }

    #[test]
    fn tungstenite_faults_map_to_transport_shapes() {
        let reset = TransportError::from(tungstenite::Error::Protocol(
            ProtocolError::ResetWithoutClosingHandshake,
        ));
        assert!(matches!(
            reset,
            TransportError::Closed {
                code: CLOSE_ABNORMAL,
                ..
            }
        ));

        let attack = TransportError::from(tungstenite::Error::AttackAttempt);
        assert!(!attack.is_reconnectable(), "protocol faults are terminal");
    }

    #[test]
    fn decode_faults_are_terminal() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: Error = WsError::MessageParse(parse).into();
        assert_eq!(err.kind(), Kind::Terminal);
    }

    #[test]
    fn closed_display_omits_empty_reason() {
        assert_eq!(
            TransportError::closed(CLOSE_NORMAL, "").to_string(),
            "connection closed with code 1000"
        );
        assert_eq!(
            TransportError::closed(CLOSE_GOING_AWAY, "restart").to_string(),
            "connection closed with code 1001: restart"
        );
    }
}
