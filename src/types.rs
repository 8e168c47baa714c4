//! Re-exported types from external crates for convenience.
//!
//! These types appear in this crate's public API and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// TLS client configuration handed to transports for secure dials.
pub use rustls::ClientConfig;
/// Parsed endpoint URL.
pub use url::Url;
