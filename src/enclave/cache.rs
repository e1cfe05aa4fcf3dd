//! Enclave session cache.
//!
//! Entries are keyed by the lowercased concatenation of server name and
//! attestation URL and live for a fixed time after creation. Expired entries
//! are dropped lazily, by the next read that finds them.
//!
//! # Locking
//!
//! | Operation | Mutation lock | Map lock |
//! |-----------|---------------|----------|
//! | `get` | no | read (write to drop an expired entry) |
//! | `create` | yes | write |
//! | `invalidate` | yes | read, then write |
//!
//! `get` may therefore observe a concurrent `create` or `invalidate` either
//! before or after it takes effect. The replay-protection counter is an
//! atomic and is bumped by every `get` and `create`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::{Clock, EnclaveSession, SystemClock};
use crate::error::{Result, TdsError};

/// How long a cached session stays valid.
pub const ENCLAVE_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Debug)]
struct Entry {
    session: EnclaveSession,
    expires_at: Instant,
}

/// Cache of enclave sessions with a replay-protection counter.
#[derive(Debug)]
pub struct EnclaveSessionCache {
    entries: RwLock<HashMap<String, Entry>>,
    mutation: Mutex<()>,
    counter: AtomicI64,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl Default for EnclaveSessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EnclaveSessionCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
            counter: AtomicI64::new(0),
            clock,
            ttl: ENCLAVE_SESSION_TTL,
        }
    }

    fn cache_key(server: &str, attestation_url: &str) -> String {
        let mut key = String::with_capacity(server.len() + attestation_url.len());
        key.push_str(server);
        key.push_str(attestation_url);
        key.to_lowercase()
    }

    fn next_counter(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Look up the session for `server` and `attestation_url`.
    ///
    /// Always returns a new counter value, hit or miss.
    pub fn get(&self, server: &str, attestation_url: &str) -> (Option<EnclaveSession>, i64) {
        let counter = self.next_counter();
        let key = Self::cache_key(server, attestation_url);
        let now = self.clock.now();

        let found = match self.entries.read().get(&key) {
            None => return (None, counter),
            Some(entry) if now < entry.expires_at => return (Some(entry.session.clone()), counter),
            Some(entry) => entry.session.session_id(),
        };

        // Expired; drop it unless it was replaced meanwhile
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&key) {
            if entry.session.session_id() == found && now >= entry.expires_at {
                entries.remove(&key);
                tracing::debug!(server, attestation_url, "Dropped expired enclave session");
            }
        }
        (None, counter)
    }

    /// Cache a new session, replacing any existing one.
    pub fn create(
        &self,
        attestation_url: &str,
        server: &str,
        shared_secret: Vec<u8>,
        session_id: i64,
    ) -> (EnclaveSession, i64) {
        let _guard = self.mutation.lock();

        let session = EnclaveSession::new(shared_secret, session_id);
        let entry = Entry {
            session: session.clone(),
            expires_at: self.clock.now() + self.ttl,
        };
        self.entries
            .write()
            .insert(Self::cache_key(server, attestation_url), entry);
        let counter = self.next_counter();

        tracing::debug!(server, attestation_url, session_id, "Cached enclave session");
        (session, counter)
    }

    /// Remove the cached session if it is still `session_to_invalidate`.
    ///
    /// A missing entry or one with a different session id is left alone.
    pub fn invalidate(
        &self,
        server: &str,
        attestation_url: &str,
        session_to_invalidate: &EnclaveSession,
    ) -> Result<()> {
        let _guard = self.mutation.lock();

        let (current, _) = self.get(server, attestation_url);
        match current {
            Some(current) if current.session_id() == session_to_invalidate.session_id() => {}
            _ => return Ok(()),
        }

        let removed = self
            .entries
            .write()
            .remove(&Self::cache_key(server, attestation_url));
        match removed {
            Some(entry) if entry.session.session_id() == session_to_invalidate.session_id() => {
                tracing::debug!(
                    server,
                    attestation_url,
                    session_id = session_to_invalidate.session_id(),
                    "Invalidated enclave session"
                );
                Ok(())
            }
            _ => {
                tracing::error!(server, attestation_url, "Enclave session invalidation failed");
                Err(TdsError::InvalidationFailed {
                    server: server.to_string(),
                    attestation_url: attestation_url.to_string(),
                })
            }
        }
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
