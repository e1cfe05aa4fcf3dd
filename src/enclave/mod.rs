//! Enclave module - cached attestation sessions.
//!
//! After attestation the client and the server enclave share a secret and a
//! session id. Those are cached per server and attestation URL so later
//! commands can skip attestation, and every cache access hands out a fresh
//! value of a monotonic counter used for replay protection.

mod cache;
mod clock;

use std::sync::Arc;

use zeroize::Zeroizing;

pub use cache::{EnclaveSessionCache, ENCLAVE_SESSION_TTL};
pub use clock::{Clock, ManualClock, SystemClock};

/// An established enclave session.
///
/// Clones share the secret; it is zeroed when the last clone drops.
#[derive(Clone)]
pub struct EnclaveSession {
    shared_secret: Arc<Zeroizing<Vec<u8>>>,
    session_id: i64,
}

impl EnclaveSession {
    pub fn new(shared_secret: Vec<u8>, session_id: i64) -> Self {
        Self {
            shared_secret: Arc::new(Zeroizing::new(shared_secret)),
            session_id,
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Key material shared with the enclave.
    pub fn shared_secret(&self) -> &[u8] {
        &self.shared_secret
    }
}

impl std::fmt::Debug for EnclaveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnclaveSession")
            .field("session_id", &self.session_id)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let session = EnclaveSession::new(vec![1, 2, 3], 42);
        let debug = format!("{:?}", session);
        assert!(debug.contains("42"));
        assert!(!debug.contains("[1, 2, 3]"));
    }

    #[test]
    fn test_clones_share_secret() {
        let session = EnclaveSession::new(vec![9; 32], 1);
        let clone = session.clone();
        assert_eq!(clone.shared_secret().as_ptr(), session.shared_secret().as_ptr());
    }
}
