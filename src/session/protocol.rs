//! Protocol session: one TDS conversation bound to one networking backend.
//!
//! Outbound bytes accumulate in a packet-sized buffer. A full buffer is sent
//! as a `NORMAL` packet; [`ProtocolSession::end_message`] sends the rest as
//! the `EOM` packet. Packets leave through one of three channels:
//!
//! | Channel | Used when | Write path |
//! |---------|-----------|------------|
//! | Direct  | synchronous write mode | `write_all` on the transport |
//! | Queued  | asynchronous write mode | dedicated writer task |
//! | Mars    | MARS enabled, or a child session | shared writer task, SMP framed |
//!
//! Inbound bytes from any channel go through the same [`PacketBuffer`] and
//! [`MessageAssembler`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use super::mars::{MarsConnection, MarsSession};
use super::TdsParser;
use crate::error::{Result, TdsError};
use crate::protocol::{
    clamp_packet_size, next_packet_id, packet_type, status, Message, MessageAssembler, Packet,
    PacketBuffer, PacketHeader, HEADER_SIZE,
};
use crate::transport::{
    transport_error, BoxedTransport, Endpoint, NetworkBackend, NetworkingBackend,
};
use crate::writer::{spawn_writer_task, OutboundPacket, WriterConfig, WriterHandle};

enum Channel {
    Direct {
        reader: ReadHalf<BoxedTransport>,
        writer: WriteHalf<BoxedTransport>,
    },
    Queued {
        reader: ReadHalf<BoxedTransport>,
        writer: WriterHandle,
        task: JoinHandle<Result<()>>,
    },
    Mars(MarsSession),
}

/// A TDS session (the parser's state object).
pub struct ProtocolSession {
    backend: Arc<dyn NetworkBackend>,
    parser: TdsParser,
    async_write: bool,
    writer_config: WriterConfig,
    channel: Option<Channel>,
    mars: Option<Arc<MarsConnection>>,
    packet_size: usize,
    // Outbound
    outbound: BytesMut,
    outbound_type: u8,
    packet_id: u8,
    // Inbound
    inbound: PacketBuffer,
    assembler: MessageAssembler,
    ready: VecDeque<Packet>,
    read_buf: BytesMut,
}

impl ProtocolSession {
    pub(crate) fn new(
        backend: Arc<dyn NetworkBackend>,
        parser: TdsParser,
        async_write: bool,
        writer_config: WriterConfig,
    ) -> Self {
        let packet_size = clamp_packet_size(parser.packet_size);
        Self {
            backend,
            parser,
            async_write,
            writer_config,
            channel: None,
            mars: None,
            packet_size,
            outbound: BytesMut::with_capacity(packet_size),
            outbound_type: packet_type::SQL_BATCH,
            packet_id: 1,
            inbound: PacketBuffer::new(packet_size),
            assembler: MessageAssembler::new(),
            ready: VecDeque::new(),
            read_buf: BytesMut::with_capacity(packet_size),
        }
    }

    /// Backend this session is bound to for its whole lifetime.
    pub fn backend_kind(&self) -> NetworkingBackend {
        self.backend.kind()
    }

    /// The parser this session belongs to.
    pub fn parser(&self) -> &TdsParser {
        &self.parser
    }

    /// True when writes go through the writer task.
    pub fn is_async_write(&self) -> bool {
        self.async_write
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// SMP session id when this session runs over MARS.
    pub fn mars_session_id(&self) -> Option<u16> {
        match &self.channel {
            Some(Channel::Mars(session)) => Some(session.session_id()),
            _ => None,
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Apply a packet size negotiated at login. Pending outbound bytes are kept.
    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.packet_size = clamp_packet_size(packet_size);
        self.inbound.set_packet_size(self.packet_size);
    }

    /// Open a transport through the bound backend and attach to it.
    pub async fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<()> {
        let transport = self.backend.connect(endpoint, timeout).await?;
        tracing::debug!(
            server = %self.parser.server,
            backend = %self.backend.kind(),
            connection_id = %self.parser.connection_id,
            "Session connected"
        );
        self.attach(transport).await
    }

    /// Attach to an already open transport.
    ///
    /// With MARS enabled the transport becomes a [`MarsConnection`] and this
    /// session takes its first logical session.
    pub async fn attach(&mut self, transport: BoxedTransport) -> Result<()> {
        if self.channel.is_some() {
            return Err(TdsError::Protocol("Session is already connected".into()));
        }

        let channel = if self.parser.mars_enabled {
            let connection = MarsConnection::start(transport, self.writer_config.clone());
            let session = connection.open_session().await?;
            self.mars = Some(connection);
            Channel::Mars(session)
        } else {
            let (reader, writer) = tokio::io::split(transport);
            if self.async_write {
                let (writer, task) = spawn_writer_task(writer, self.writer_config.clone());
                Channel::Queued {
                    reader,
                    writer,
                    task,
                }
            } else {
                Channel::Direct { reader, writer }
            }
        };
        self.channel = Some(channel);
        Ok(())
    }

    pub(crate) fn attach_mars(&mut self, session: MarsSession) {
        self.channel = Some(Channel::Mars(session));
    }

    /// The MARS connection this session multiplexes over, if any.
    pub fn mars_connection(&self) -> Option<Arc<MarsConnection>> {
        match &self.channel {
            Some(Channel::Mars(session)) => Some(session.connection().clone()),
            _ => self.mars.clone(),
        }
    }

    /// Start a new outbound message of `packet_type`.
    pub fn begin_message(&mut self, packet_type: u8) {
        self.outbound.clear();
        self.outbound_type = packet_type;
        self.packet_id = 1;
    }

    /// Append bytes to the current message, sending full packets as they fill.
    pub async fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        let capacity = self.packet_size - HEADER_SIZE;
        while !data.is_empty() {
            let room = capacity.saturating_sub(self.outbound.len());
            if room == 0 {
                self.flush_packet(status::NORMAL).await?;
                continue;
            }
            let take = room.min(data.len());
            self.outbound.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(())
    }

    /// Send whatever is buffered as the final packet of the message.
    pub async fn end_message(&mut self) -> Result<()> {
        self.flush_packet(status::EOM).await?;
        self.packet_id = 1;
        Ok(())
    }

    /// Send a complete message.
    pub async fn send_message(&mut self, packet_type: u8, payload: &[u8]) -> Result<()> {
        self.begin_message(packet_type);
        self.write_bytes(payload).await?;
        self.end_message().await
    }

    /// Send an attention signal (header-only packet).
    pub async fn send_attention(&mut self) -> Result<()> {
        let header = PacketHeader::new(packet_type::ATTENTION, status::EOM, 0, 1);
        self.write_packet(Packet::new(header, Bytes::new())).await
    }

    async fn flush_packet(&mut self, status: u8) -> Result<()> {
        let payload = self.outbound.split().freeze();
        let header = PacketHeader::new(self.outbound_type, status, payload.len(), self.packet_id);
        self.packet_id = next_packet_id(self.packet_id);
        self.write_packet(Packet::new(header, payload)).await
    }

    async fn write_packet(&mut self, packet: Packet) -> Result<()> {
        match self.channel.as_mut().ok_or(TdsError::ConnectionClosed)? {
            Channel::Direct { writer, .. } => {
                writer
                    .write_all(&packet.header.encode())
                    .await
                    .map_err(transport_error)?;
                writer
                    .write_all(&packet.payload)
                    .await
                    .map_err(transport_error)?;
                writer.flush().await.map_err(transport_error)?;
                Ok(())
            }
            Channel::Queued { writer, .. } => writer.send(OutboundPacket::from_packet(&packet)).await,
            Channel::Mars(session) => session.send(&packet).await,
        }
    }

    /// Read the next complete message.
    pub async fn read_message(&mut self) -> Result<Message> {
        loop {
            while let Some(packet) = self.ready.pop_front() {
                if let Some(message) = self.assembler.push(packet)? {
                    return Ok(message);
                }
            }

            let chunk = self.read_chunk().await?;
            let packets = self.inbound.push(&chunk)?;
            self.ready.extend(packets);
        }
    }

    async fn read_chunk(&mut self) -> Result<Bytes> {
        match self.channel.as_mut().ok_or(TdsError::ConnectionClosed)? {
            Channel::Direct { reader, .. } | Channel::Queued { reader, .. } => {
                self.read_buf.reserve(self.packet_size);
                let n = reader
                    .read_buf(&mut self.read_buf)
                    .await
                    .map_err(transport_error)?;
                if n == 0 {
                    return Err(TdsError::ConnectionClosed);
                }
                Ok(self.read_buf.split().freeze())
            }
            Channel::Mars(session) => session.recv().await,
        }
    }

    /// Close the session, draining queued writes.
    pub async fn close(&mut self) -> Result<()> {
        // Child sessions keep their own reference to the connection
        self.mars = None;
        match self.channel.take() {
            None => Ok(()),
            Some(Channel::Direct { mut writer, .. }) => {
                writer.shutdown().await.map_err(transport_error)
            }
            Some(Channel::Queued { writer, task, .. }) => {
                drop(writer);
                task.await
                    .map_err(|e| TdsError::Protocol(format!("Writer task failed: {}", e)))?
            }
            Some(Channel::Mars(mut session)) => session.close().await,
        }
    }
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("backend", &self.backend.kind())
            .field("async_write", &self.async_write)
            .field("connected", &self.is_connected())
            .field("mars_session_id", &self.mars_session_id())
            .field("packet_size", &self.packet_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MIN_PACKET_SIZE;
    use crate::transport::ManagedBackend;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn session(async_write: bool, packet_size: usize) -> ProtocolSession {
        let parser = TdsParser::new("localhost").with_packet_size(packet_size);
        ProtocolSession::new(
            Arc::new(ManagedBackend::new()),
            parser,
            async_write,
            WriterConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_write_before_connect_fails() {
        let mut session = session(false, 4096);
        let result = session.send_message(packet_type::SQL_BATCH, b"x").await;
        assert!(matches!(result, Err(TdsError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_direct_send_single_packet() {
        let (client, mut server) = duplex(8192);
        let mut session = session(false, 4096);
        session.attach(Box::new(client)).await.unwrap();

        session
            .send_message(packet_type::SQL_BATCH, b"select 1")
            .await
            .unwrap();

        let mut buf = [0u8; HEADER_SIZE + 8];
        server.read_exact(&mut buf).await.unwrap();
        let header = PacketHeader::decode(&buf).unwrap();
        assert!(header.is_end_of_message());
        assert_eq!(header.packet_id, 1);
        assert_eq!(&buf[HEADER_SIZE..], b"select 1");
    }

    #[tokio::test]
    async fn test_send_attention_is_header_only() {
        let (client, mut server) = duplex(8192);
        let mut session = session(true, 4096);
        session.attach(Box::new(client)).await.unwrap();

        session.send_attention().await.unwrap();

        let mut buf = [0u8; HEADER_SIZE];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [packet_type::ATTENTION, status::EOM, 0x00, 0x08, 0, 0, 1, 0]);

        session.close().await.unwrap();
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_mars_connection() {
        let (client, _server) = duplex(8192);
        let parser = TdsParser::new("localhost").with_mars(true);
        let mut session = ProtocolSession::new(
            Arc::new(ManagedBackend::new()),
            parser,
            false,
            WriterConfig::default(),
        );
        session.attach(Box::new(client)).await.unwrap();

        let connection = Arc::downgrade(&session.mars_connection().unwrap());
        session.close().await.unwrap();

        assert!(session.mars_connection().is_none());
        assert!(!session.is_connected());
        assert!(connection.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_queued_send_splits_into_packets() {
        let (client, mut server) = duplex(16384);
        let mut session = session(true, MIN_PACKET_SIZE);
        session.attach(Box::new(client)).await.unwrap();

        let payload = vec![0x5Au8; 1200];
        session
            .send_message(packet_type::RPC, &payload)
            .await
            .unwrap();

        let mut received = Vec::new();
        let mut ids = Vec::new();
        loop {
            let mut header = [0u8; HEADER_SIZE];
            server.read_exact(&mut header).await.unwrap();
            let header = PacketHeader::decode(&header).unwrap();
            let mut body = vec![0u8; header.payload_length()];
            server.read_exact(&mut body).await.unwrap();
            received.extend(body);
            ids.push(header.packet_id);
            if header.is_end_of_message() {
                break;
            }
        }
        assert_eq!(received, payload);
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_read_message_reassembles() {
        let (client, mut server) = duplex(16384);
        let mut session = session(false, MIN_PACKET_SIZE);
        session.attach(Box::new(client)).await.unwrap();

        let payload: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        for packet in crate::protocol::split_message(
            packet_type::TABULAR_RESULT,
            &payload,
            MIN_PACKET_SIZE,
            1,
        ) {
            server.write_all(&packet.to_bytes()).await.unwrap();
        }

        let message = session.read_message().await.unwrap();
        assert_eq!(message.packet_type, packet_type::TABULAR_RESULT);
        assert_eq!(message.payload(), &payload[..]);
    }

    #[tokio::test]
    async fn test_read_after_eof() {
        let (client, server) = duplex(1024);
        let mut session = session(false, 4096);
        session.attach(Box::new(client)).await.unwrap();
        drop(server);

        assert!(matches!(
            session.read_message().await,
            Err(TdsError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_attach_twice_rejected() {
        let (a, _a) = duplex(64);
        let (b, _b) = duplex(64);
        let mut session = session(false, 4096);
        session.attach(Box::new(a)).await.unwrap();
        assert!(session.attach(Box::new(b)).await.is_err());
    }

    #[tokio::test]
    async fn test_close_drains_queue() {
        let (client, mut server) = duplex(16384);
        let mut session = session(true, 4096);
        session.attach(Box::new(client)).await.unwrap();

        session.send_message(packet_type::SQL_BATCH, b"a").await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_connected());

        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest.len(), HEADER_SIZE + 1);
    }

    #[test]
    fn test_packet_size_clamped() {
        let mut session = session(false, 100);
        assert_eq!(session.packet_size(), MIN_PACKET_SIZE);
        session.set_packet_size(8000);
        assert_eq!(session.packet_size(), 8000);
    }
}
