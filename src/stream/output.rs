//! PLP output stream.
//!
//! Each write becomes one chunk:
//!
//! ```text
//! ┌──────────────┬─────────────────────┐
//! │ Length       │ Payload             │
//! │ u32 LE       │ Length bytes        │
//! └──────────────┴─────────────────────┘
//! ```
//!
//! A zero-length chunk terminates the value. A text value may arrive with a
//! byte-order mark in front of its first write; when the stream is created
//! with that preamble it is removed once, from the first write only.
//!
//! # Example
//!
//! ```no_run
//! # async fn run(session: &mut tds_client_core::session::ProtocolSession) -> tds_client_core::Result<()> {
//! use tds_client_core::stream::{TdsOutputStream, UNICODE_PREAMBLE};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let mut stream = TdsOutputStream::new(session, Some(UNICODE_PREAMBLE));
//! stream.write(&[0xFF, 0xFE, b'h', 0, b'i', 0], &cancel).await?;
//! stream.finish().await?;
//! # Ok(())
//! # }
//! ```

use tokio_util::sync::CancellationToken;

use crate::codec::encode_u32;
use crate::error::{Result, TdsError};
use crate::session::ProtocolSession;

/// UTF-16LE byte-order mark.
pub const UNICODE_PREAMBLE: &[u8] = &[0xFF, 0xFE];

/// Size of a chunk length prefix.
pub const PLP_CHUNK_HEADER_SIZE: usize = 4;

/// Writes PLP chunks through a session in asynchronous-write mode.
pub struct TdsOutputStream<'a> {
    session: &'a mut ProtocolSession,
    preamble: Option<&'a [u8]>,
}

impl<'a> TdsOutputStream<'a> {
    /// Stream over `session`, stripping `preamble` from the first write if
    /// it matches.
    pub fn new(session: &'a mut ProtocolSession, preamble: Option<&'a [u8]>) -> Self {
        Self { session, preamble }
    }

    /// True until a write at least as long as the preamble has been seen.
    pub fn preamble_pending(&self) -> bool {
        self.preamble.is_some()
    }

    /// Write `buffer` as one chunk.
    ///
    /// An empty remainder (after preamble removal) writes nothing. If `cancel`
    /// fires first the call fails with [`TdsError::Cancelled`]; nothing is
    /// retried.
    ///
    /// The session must be in asynchronous-write mode.
    pub async fn write(&mut self, buffer: &[u8], cancel: &CancellationToken) -> Result<()> {
        debug_assert!(
            self.session.is_async_write(),
            "TdsOutputStream requires a session in asynchronous-write mode"
        );

        let payload = self.strip_preamble(buffer);
        if payload.is_empty() {
            return Ok(());
        }

        let session = &mut *self.session;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TdsError::Cancelled),
            result = write_chunk(session, payload) => result,
        }
    }

    /// Write the terminating zero-length chunk.
    pub async fn finish(self) -> Result<()> {
        self.session.write_bytes(&[0u8; PLP_CHUNK_HEADER_SIZE]).await
    }

    // Writes shorter than the preamble pass through and leave it pending.
    // The first full-length comparison, match or not, ends stripping.
    fn strip_preamble<'b>(&mut self, buffer: &'b [u8]) -> &'b [u8] {
        let preamble = match self.preamble {
            Some(preamble) if buffer.len() >= preamble.len() => preamble,
            _ => return buffer,
        };
        self.preamble = None;
        if buffer.starts_with(preamble) {
            &buffer[preamble.len()..]
        } else {
            buffer
        }
    }
}

async fn write_chunk(session: &mut ProtocolSession, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| TdsError::Protocol(format!("PLP chunk of {} bytes", payload.len())))?;
    let mut header = [0u8; PLP_CHUNK_HEADER_SIZE];
    encode_u32(len, &mut header)?;
    session.write_bytes(&header).await?;
    session.write_bytes(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{packet_type, PacketHeader, HEADER_SIZE};
    use crate::session::{SessionFactory, TdsParser};
    use crate::transport::BackendSelector;
    use crate::writer::WriterConfig;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    async fn async_session() -> (ProtocolSession, DuplexStream) {
        let factory = SessionFactory::new(
            Arc::new(BackendSelector::with_lookup(|_| Some(true))),
            WriterConfig::default(),
        );
        let parser = TdsParser::new("db").with_async_write(true);
        let mut session = factory.create_session(&parser);
        let (client, server) = duplex(16384);
        session.attach(Box::new(client)).await.unwrap();
        session.begin_message(packet_type::RPC);
        (session, server)
    }

    /// Flush the message and return its payload as the server sees it.
    async fn sent_payload(mut session: ProtocolSession, server: &mut DuplexStream) -> Vec<u8> {
        session.end_message().await.unwrap();
        let mut header = [0u8; HEADER_SIZE];
        server.read_exact(&mut header).await.unwrap();
        let header = PacketHeader::decode(&header).unwrap();
        let mut payload = vec![0u8; header.payload_length()];
        server.read_exact(&mut payload).await.unwrap();
        payload
    }

    #[tokio::test]
    async fn test_preamble_stripped_from_first_write() {
        let (mut session, mut server) = async_session().await;
        let cancel = CancellationToken::new();

        let mut stream = TdsOutputStream::new(&mut session, Some(UNICODE_PREAMBLE));
        stream
            .write(&[0xFF, 0xFE, 0x41, 0x00], &cancel)
            .await
            .unwrap();
        assert!(!stream.preamble_pending());

        let payload = sent_payload(session, &mut server).await;
        assert_eq!(payload, vec![2, 0, 0, 0, 0x41, 0x00]);
    }

    #[tokio::test]
    async fn test_preamble_only_checked_once() {
        let (mut session, mut server) = async_session().await;
        let cancel = CancellationToken::new();

        let mut stream = TdsOutputStream::new(&mut session, Some(UNICODE_PREAMBLE));
        stream.write(&[0x41, 0x00], &cancel).await.unwrap();
        stream.write(&[0xFF, 0xFE], &cancel).await.unwrap();

        let payload = sent_payload(session, &mut server).await;
        assert_eq!(payload, vec![2, 0, 0, 0, 0x41, 0x00, 2, 0, 0, 0, 0xFF, 0xFE]);
    }

    #[tokio::test]
    async fn test_short_first_write_keeps_preamble_pending() {
        let (mut session, mut server) = async_session().await;
        let cancel = CancellationToken::new();

        let mut stream = TdsOutputStream::new(&mut session, Some(UNICODE_PREAMBLE));
        stream.write(&[0x41], &cancel).await.unwrap();
        assert!(stream.preamble_pending());
        stream.write(&[0xFF, 0xFE, 0x42, 0x00], &cancel).await.unwrap();
        assert!(!stream.preamble_pending());

        let payload = sent_payload(session, &mut server).await;
        assert_eq!(payload, vec![1, 0, 0, 0, 0x41, 2, 0, 0, 0, 0x42, 0x00]);
    }

    #[tokio::test]
    async fn test_empty_remainder_writes_nothing() {
        let (mut session, mut server) = async_session().await;
        let cancel = CancellationToken::new();

        let mut stream = TdsOutputStream::new(&mut session, Some(UNICODE_PREAMBLE));
        stream.write(UNICODE_PREAMBLE, &cancel).await.unwrap();
        stream.write(&[], &cancel).await.unwrap();
        stream.finish().await.unwrap();

        let payload = sent_payload(session, &mut server).await;
        assert_eq!(payload, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_cancelled_write() {
        let (mut session, _server) = async_session().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stream = TdsOutputStream::new(&mut session, None);
        let result = stream.write(b"data", &cancel).await;
        assert!(matches!(result, Err(TdsError::Cancelled)));
    }

    #[tokio::test]
    async fn test_chunk_larger_than_packet() {
        let (mut session, mut server) = async_session().await;
        let cancel = CancellationToken::new();
        let data = vec![7u8; 5000];

        let mut stream = TdsOutputStream::new(&mut session, None);
        stream.write(&data, &cancel).await.unwrap();
        session.end_message().await.unwrap();

        let mut received = Vec::new();
        loop {
            let mut header = [0u8; HEADER_SIZE];
            server.read_exact(&mut header).await.unwrap();
            let header = PacketHeader::decode(&header).unwrap();
            let mut body = vec![0u8; header.payload_length()];
            server.read_exact(&mut body).await.unwrap();
            received.extend(body);
            if header.is_end_of_message() {
                break;
            }
        }
        assert_eq!(&received[..4], &5000u32.to_le_bytes());
        assert_eq!(&received[4..], &data[..]);
    }
}
