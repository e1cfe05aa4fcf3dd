//! Named pipe connections.
//!
//! - Unix: Unix domain socket at the given path
//! - Windows: Named Pipe client

use super::{transport_error, BoxedTransport};
use crate::error::Result;

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use tokio::net::UnixStream;

    /// Connect to a Unix domain socket.
    pub async fn connect_pipe(path: &str) -> Result<BoxedTransport> {
        let stream = UnixStream::connect(path).await.map_err(transport_error)?;
        Ok(Box::new(stream))
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::time::Duration;
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;

    /// Connect to a named pipe, waiting while every instance is busy.
    pub async fn connect_pipe(path: &str) -> Result<BoxedTransport> {
        loop {
            match ClientOptions::new().open(path) {
                Ok(client) => return Ok(Box::new(client)),
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => return Err(transport_error(e)),
            }
        }
    }
}

#[cfg(unix)]
pub use unix_impl::connect_pipe;

#[cfg(windows)]
pub use windows_impl::connect_pipe;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    fn socket_path() -> String {
        format!(
            "/tmp/tds-{}-{}.sock",
            std::process::id(),
            &uuid::Uuid::new_v4().simple().to_string()[..16]
        )
    }

    #[tokio::test]
    async fn test_connect_and_echo() {
        let path = socket_path();
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let mut client = connect_pipe(&path).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_connect_missing_pipe_fails() {
        let result = connect_pipe("/tmp/tds-does-not-exist.sock").await;
        assert!(matches!(
            result,
            Err(crate::error::TdsError::Transport { .. })
        ));
    }
}
