#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::frame::Frame;
use crate::Result;
use crate::error::Error;

const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_WRITE_RETRY_DELAY_DURATION: Duration = Duration::from_millis(100);

/// Callback invoked with the close code and reason when the remote end closes
/// the connection.
///
/// It runs synchronously on the task that observed the close frame, while no
/// lifecycle lock is held. It must not block; schedule reconnection work on a
/// separate task instead of driving it from inside the callback.
pub type CloseHandler = Arc<dyn Fn(u16, &str) -> Result<()> + Send + Sync>;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed delay between reconnect attempts. Also the minimum spacing enforced
    /// between two consecutive reconnect episodes.
    pub reconnect_delay: Duration,
    /// Pause taken by the write queue after a failed delivery
    pub write_retry_delay: Duration,
    /// Reconnect automatically after a recognized closure or network fault
    pub reconnect: bool,
    /// Dial with a TLS configuration built from the client's trust store
    pub secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY_DURATION,
            write_retry_delay: DEFAULT_WRITE_RETRY_DELAY_DURATION,
            reconnect: false,
            secure: false,
        }
    }
}

/// Target of the connection, as `scheme://host/path`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl Endpoint {
    #[must_use]
    pub fn new<S: Into<String>, H: Into<String>, P: Into<String>>(
        scheme: S,
        host: H,
        path: P,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path: path.into(),
        }
    }

    /// Renders the endpoint as a URL, inserting the `/` between host and path
    /// when the path lacks one.
    pub fn to_url(&self) -> Result<Url> {
        if self.host.is_empty() {
            return Err(Error::validation("endpoint host is empty"));
        }
        let separator = if self.path.is_empty() || self.path.starts_with('/') {
            ""
        } else {
            "/"
        };
        let url = Url::parse(&format!(
            "{}://{}{separator}{}",
            self.scheme, self.host, self.path
        ))?;
        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path)
    }
}

/// Mutable per-client settings. Read on every dial.
#[derive(Clone)]
pub(crate) struct Settings {
    pub(crate) url: Url,
    pub(crate) secure: bool,
    pub(crate) reconnect: bool,
    pub(crate) reconnect_delay: Duration,
    pub(crate) write_retry_delay: Duration,
    pub(crate) init_message: Option<Frame>,
    pub(crate) close_handler: Option<CloseHandler>,
}

impl Settings {
    pub(crate) fn new(url: Url, config: Config) -> Self {
        Self {
            url,
            secure: config.secure,
            reconnect: config.reconnect,
            reconnect_delay: config.reconnect_delay,
            write_retry_delay: config.write_retry_delay,
            init_message: None,
            close_handler: None,
        }
    }
}
