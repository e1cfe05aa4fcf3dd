//! Native backend: sockets are created and connected by the OS through
//! `std::net`, off the async runtime, then registered with tokio.

use std::io;
use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{
    connect_timeout_error, transport_error, BoxedTransport, EncryptionOptions, Endpoint,
    NetworkBackend, NetworkingBackend, STATUS_SUCCESS,
};
use crate::error::{Result, TdsError};

/// OS socket network stack.
#[derive(Debug)]
pub struct NativeBackend {
    status: u32,
    encryption: EncryptionOptions,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            status: STATUS_SUCCESS,
            encryption: EncryptionOptions::Off,
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Time left before `deadline`, or `TimedOut` once it has passed.
fn remaining(deadline: Instant) -> io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "connect deadline passed"));
    }
    Ok(left)
}

/// Try each address in turn, giving each only the time left before `deadline`.
fn connect_any<I>(addrs: I, deadline: Instant) -> io::Result<StdTcpStream>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut last_err = None;
    for addr in addrs {
        match StdTcpStream::connect_timeout(&addr, remaining(deadline)?) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no address to connect to")
    }))
}

/// Resolve and connect. Resolution counts against the same deadline.
fn connect_blocking(host: &str, port: u16, deadline: Instant) -> io::Result<StdTcpStream> {
    let addrs = (host, port).to_socket_addrs()?;
    remaining(deadline)?;
    let stream = connect_any(addrs, deadline)?;
    stream.set_nodelay(true)?;
    stream.set_nonblocking(true)?;
    Ok(stream)
}

#[async_trait]
impl NetworkBackend for NativeBackend {
    fn kind(&self) -> NetworkingBackend {
        NetworkingBackend::Native
    }

    async fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxedTransport> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let host = host.clone();
                let port = *port;
                let deadline = Instant::now() + timeout;
                // The blocking thread may outlive the timeout; its socket is then dropped.
                let connect = tokio::task::spawn_blocking(move || {
                    connect_blocking(&host, port, deadline)
                });
                let stream = tokio::time::timeout(timeout, connect)
                    .await
                    .map_err(|_| connect_timeout_error(endpoint, timeout))?
                    .map_err(|e| TdsError::Protocol(format!("Native connect task failed: {}", e)))?
                    .map_err(|e| {
                        if e.kind() == io::ErrorKind::TimedOut {
                            connect_timeout_error(endpoint, timeout)
                        } else {
                            transport_error(e)
                        }
                    })?;

                let stream = TcpStream::from_std(stream).map_err(transport_error)?;
                tracing::debug!(%endpoint, "Native backend connected");
                Ok(Box::new(stream))
            }

            #[cfg(windows)]
            Endpoint::NamedPipe { path } => tokio::time::timeout(timeout, super::connect_pipe(path))
                .await
                .map_err(|_| connect_timeout_error(endpoint, timeout))?,

            #[cfg(not(windows))]
            Endpoint::NamedPipe { .. } => Err(TdsError::PlatformUnsupported(
                "named pipes require the managed networking backend on this platform".into(),
            )),
        }
    }

    fn encryption_options(&self) -> EncryptionOptions {
        self.encryption
    }

    fn status(&self) -> u32 {
        self.status
    }
}
