//! Certificate trust store used for secure dials.

use std::sync::{Arc, PoisonError, RwLock};

use rustls::crypto::ring;
use rustls::{ClientConfig, RootCertStore};

use crate::Result;

/// Append-only pool of trusted root certificates.
///
/// The pool is allocated empty when the client is built and never reset.
/// Clones share the same pool, so certificates appended through any handle
/// are seen by every subsequent dial.
#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: Arc<RwLock<RootCertStore>>,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Arc::new(RwLock::new(RootCertStore::empty())),
        }
    }

    /// Parses every certificate in `pem` and adds the ones that are valid trust
    /// anchors. Returns `true` if at least one was accepted.
    pub fn append_pem(&self, pem: &[u8]) -> bool {
        let mut reader = pem;
        let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
            .filter_map(std::result::Result::ok)
            .collect();
        if certs.is_empty() {
            return false;
        }

        // RootCertStore has no partially-applied state, so a poisoned lock is safe to reuse.
        let (added, ignored) = self
            .roots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_parsable_certificates(certs);

        if ignored > 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(added, ignored, "Ignored unparsable certificates");
        }

        added > 0
    }

    /// Number of accepted certificates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a TLS client configuration from a snapshot of the current pool.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let roots = self
            .roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_CA: &[u8] = include_bytes!("../../tests/fixtures/root_ca.pem");

    #[test]
    fn empty_pem_is_rejected() {
        let store = TrustStore::new();
        assert!(!store.append_pem(b""), "empty PEM should not be accepted");
        assert!(store.is_empty());
    }

    #[test]
    fn invalid_pem_is_rejected() {
        let store = TrustStore::new();
        store.append_pem(ROOT_CA);
        let before = store.len();

        let garbage = b"-----BEGIN CERTIFICATE-----\nbm90IGEgY2VydA==\n-----END CERTIFICATE-----\n";
        assert!(!store.append_pem(garbage), "garbage PEM should not be accepted");
        assert!(!store.append_pem(b"hello"), "plain text should not be accepted");
        assert_eq!(store.len(), before);
    }

    #[test]
    fn valid_pem_is_accepted() {
        let store = TrustStore::new();
        assert!(store.append_pem(ROOT_CA), "valid PEM should be accepted");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clones_share_the_pool() {
        let store = TrustStore::new();
        let other = store.clone();
        assert!(other.append_pem(ROOT_CA), "valid PEM should be accepted");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn client_config_builds_from_snapshot() {
        let store = TrustStore::new();
        store.append_pem(ROOT_CA);
        store.client_config().unwrap();
    }
}
