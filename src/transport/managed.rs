//! Managed backend: every connection is opened with tokio.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{
    connect_pipe, connect_timeout_error, transport_error, BoxedTransport, EncryptionOptions,
    Endpoint, NetworkBackend, NetworkingBackend, STATUS_SUCCESS,
};
use crate::error::Result;

/// Pure tokio network stack.
#[derive(Debug, Default)]
pub struct ManagedBackend;

impl ManagedBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetworkBackend for ManagedBackend {
    fn kind(&self) -> NetworkingBackend {
        NetworkingBackend::Managed
    }

    async fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxedTransport> {
        let connect = async {
            match endpoint {
                Endpoint::Tcp { host, port } => {
                    let stream = TcpStream::connect((host.as_str(), *port))
                        .await
                        .map_err(transport_error)?;
                    stream.set_nodelay(true).map_err(transport_error)?;
                    Ok::<BoxedTransport, crate::TdsError>(Box::new(stream))
                }
                Endpoint::NamedPipe { path } => connect_pipe(path).await,
            }
        };

        let transport = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| connect_timeout_error(endpoint, timeout))??;
        tracing::debug!(%endpoint, "Managed backend connected");
        Ok(transport)
    }

    fn encryption_options(&self) -> EncryptionOptions {
        EncryptionOptions::Off
    }

    fn status(&self) -> u32 {
        STATUS_SUCCESS
    }
}
