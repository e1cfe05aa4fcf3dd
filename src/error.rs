//! Error types for tds-client-core.

use std::time::Duration;

use thiserror::Error;

use crate::auth::{AuthRetryState, AuthenticationMethod};

/// Native error number reported when the server resets the connection
/// during a long-running login.
pub const SERVER_TIMEOUT_NATIVE_ERROR: i32 = 10054;

/// Native error number reported when the client-side wait times out.
pub const CLIENT_TIMEOUT_NATIVE_ERROR: i32 = 258;

/// Main error type for all TDS operations.
#[derive(Debug, Error)]
pub enum TdsError {
    /// I/O error during socket/pipe operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// A codec operation was handed a buffer that is too small.
    #[error("Insufficient buffer: need {needed} bytes, got {actual}")]
    InsufficientBuffer { needed: usize, actual: usize },

    /// A provider was registered for a method it does not support.
    #[error("Authentication method {method} is not supported by provider {provider}")]
    UnsupportedAuthentication {
        method: AuthenticationMethod,
        provider: String,
    },

    /// Authentication method name not recognized.
    #[error("Unsupported authentication method name: {0}")]
    UnknownAuthenticationMethod(String),

    /// Illegal transition of the AD timeout-retry state machine.
    #[error("Invalid authentication retry state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: AuthRetryState,
        to: AuthRetryState,
    },

    /// The enclave session cache failed to remove the entry it just observed.
    #[error("Failed to invalidate enclave session for server {server} and attestation URL {attestation_url}")]
    InvalidationFailed {
        server: String,
        attestation_url: String,
    },

    /// Capability not available on this platform.
    #[error("Not supported on this platform: {0}")]
    PlatformUnsupported(String),

    /// Transport failure carrying the backend's native error number.
    #[error("Transport error {native_code}: {message}")]
    Transport { native_code: i32, message: String },

    /// Error reported by the server.
    #[error("Server error {number}: {message}")]
    Server { number: i32, message: String },

    /// Protocol error (bad packet header, unexpected SMP flags, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation did not complete within the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl TdsError {
    /// Native error number carried by this error, if any.
    ///
    /// Transport errors report the backend's native number; server errors
    /// report the server's error number.
    pub fn native_error_code(&self) -> Option<i32> {
        match self {
            TdsError::Transport { native_code, .. } => Some(*native_code),
            TdsError::Server { number, .. } => Some(*number),
            _ => None,
        }
    }

    /// True for the two timeout signatures a long-running AD login may hit.
    pub fn is_login_timeout(&self) -> bool {
        matches!(
            self.native_error_code(),
            Some(SERVER_TIMEOUT_NATIVE_ERROR) | Some(CLIENT_TIMEOUT_NATIVE_ERROR)
        )
    }
}

/// Result type alias using TdsError.
pub type Result<T> = std::result::Result<T, TdsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_code() {
        let err = TdsError::Transport {
            native_code: 10054,
            message: "reset".into(),
        };
        assert_eq!(err.native_error_code(), Some(10054));
        assert!(err.is_login_timeout());

        let err = TdsError::Server {
            number: 258,
            message: "wait".into(),
        };
        assert!(err.is_login_timeout());

        let err = TdsError::Server {
            number: 18456,
            message: "login failed".into(),
        };
        assert!(!err.is_login_timeout());
        assert_eq!(TdsError::Cancelled.native_error_code(), None);
    }

    #[test]
    fn test_insufficient_buffer_message() {
        let err = TdsError::InsufficientBuffer {
            needed: 16,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Insufficient buffer: need 16 bytes, got 3");
    }
}
