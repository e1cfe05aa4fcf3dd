//! Secrets that are wiped from memory when dropped.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// A password or similar secret.
///
/// The contents are only reachable inside [`SecureString::with_exposed`].
/// Clones are independent copies, each wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    /// Run `f` with the plaintext.
    pub fn with_exposed<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.inner)
    }

    /// UTF-16LE encoding, as sent in LOGIN7, in a buffer wiped on drop.
    pub fn to_utf16le(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(self.inner.len() * 2));
        for unit in self.inner.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}
