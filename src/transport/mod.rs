//! Transport module - connection establishment below the TDS layer.
//!
//! Provides:
//! - [`NetworkBackend`]: the seam between sessions and a concrete network stack
//! - [`ManagedBackend`]: pure tokio TCP and pipe connections
//! - [`NativeBackend`]: OS sockets created through `std::net`, handed to tokio
//! - [`BackendSelector`]: picks one of the two once, on first use
//! - Named pipe / Unix domain socket connections

mod backend;
mod managed;
mod native;
mod pipe;

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{TdsError, CLIENT_TIMEOUT_NATIVE_ERROR, SERVER_TIMEOUT_NATIVE_ERROR};

pub use backend::{BackendSelector, NetworkingBackend, USE_MANAGED_NETWORKING_SWITCH};
pub use managed::ManagedBackend;
pub use native::NativeBackend;
pub use pipe::connect_pipe;

/// Status reported by a backend that initialized without error.
pub const STATUS_SUCCESS: u32 = 0;

/// Byte stream a session runs over.
pub trait TransportIo: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> TransportIo for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Boxed transport handed from a backend to a session.
pub type BoxedTransport = Box<dyn TransportIo>;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port.
    Tcp { host: String, port: u16 },
    /// Named pipe path (`\\server\pipe\name` on Windows, a socket path on Unix).
    NamedPipe { path: String },
}

impl Endpoint {
    /// TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Named pipe endpoint.
    pub fn pipe(path: impl Into<String>) -> Self {
        Endpoint::NamedPipe { path: path.into() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp:{},{}", host, port),
            Endpoint::NamedPipe { path } => write!(f, "np:{}", path),
        }
    }
}

/// Encryption capability a backend advertises for pre-login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionOptions {
    #[default]
    Off,
    On,
    NotSupported,
    Required,
    Login,
}

/// A network stack able to open transports for sessions.
#[async_trait]
pub trait NetworkBackend: Send + Sync + fmt::Debug {
    /// Which stack this is.
    fn kind(&self) -> NetworkingBackend;

    /// Open a transport to `endpoint`, giving up after `timeout`.
    async fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> crate::Result<BoxedTransport>;

    /// Encryption options offered by this stack.
    fn encryption_options(&self) -> EncryptionOptions;

    /// Initialization status; [`STATUS_SUCCESS`] when usable.
    fn status(&self) -> u32;
}

/// Map a connect/read failure onto a transport error with a native number.
///
/// Timeouts and resets get the numbers the login retry logic recognizes.
pub(crate) fn transport_error(err: io::Error) -> TdsError {
    let native_code = match err.kind() {
        io::ErrorKind::TimedOut => CLIENT_TIMEOUT_NATIVE_ERROR,
        io::ErrorKind::ConnectionReset => SERVER_TIMEOUT_NATIVE_ERROR,
        _ => err.raw_os_error().unwrap_or(-1),
    };
    TdsError::Transport {
        native_code,
        message: err.to_string(),
    }
}

pub(crate) fn connect_timeout_error(endpoint: &Endpoint, timeout: Duration) -> TdsError {
    TdsError::Transport {
        native_code: CLIENT_TIMEOUT_NATIVE_ERROR,
        message: format!("Connecting to {} timed out after {:?}", endpoint, timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::tcp("db", 1433).to_string(), "tcp:db,1433");
        assert_eq!(Endpoint::pipe("/tmp/sql.sock").to_string(), "np:/tmp/sql.sock");
    }

    #[test]
    fn test_transport_error_codes() {
        let err = transport_error(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(err.native_error_code(), Some(CLIENT_TIMEOUT_NATIVE_ERROR));

        let err = transport_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_login_timeout());

        let err = transport_error(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.native_error_code(), Some(-1));
    }
}
