use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// Classification of every fault surfaced by this crate.
///
/// The kind attached to a transport fault is the outcome of the reconnect
/// policy: [`Kind::Reconnectable`] faults may have started a background
/// recovery, every other kind never does.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// There is no live connection and dialing on demand failed
    NotConnected,
    /// Recognized closure or network-level fault, eligible for automatic reconnection
    Reconnectable,
    /// Decode or protocol fault that never triggers reconnection
    Terminal,
    /// A connect attempt (dial or initialization message) failed
    Dial,
    /// Caller-supplied input was rejected before reaching the transport
    Validation,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Whether this fault is eligible for automatic reconnection.
    #[must_use]
    pub fn is_reconnectable(&self) -> bool {
        self.kind == Kind::Reconnectable
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_should_succeed() {
        let error = Error::validation("text frame is not valid UTF-8");

        assert_eq!(error.kind(), Kind::Validation);
        assert_eq!(
            error.to_string(),
            "Validation: invalid: text frame is not valid UTF-8"
        );
    }

    #[test]
    fn downcast_should_recover_source() {
        let error: Error = url::ParseError::EmptyHost.into();

        assert_eq!(error.kind(), Kind::Validation);
        assert_eq!(
            error.downcast_ref::<url::ParseError>(),
            Some(&url::ParseError::EmptyHost)
        );
        assert!(!error.is_reconnectable(), "validation faults are terminal");
    }
}
