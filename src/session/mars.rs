//! MARS: several logical sessions over one physical connection.
//!
//! Every payload on a MARS connection is wrapped in an SMP header naming the
//! session it belongs to. One writer task serializes outbound packets from all
//! sessions; one reader task splits the inbound stream by session id and
//! forwards each DATA payload to the owning session's channel.
//!
//! ```text
//!                 ┌──────────────┐
//! MarsSession 0 ─►│              │
//! MarsSession 1 ─►│ writer task  │─► transport
//! MarsSession N ─►│              │
//!                 └──────────────┘
//!                 ┌──────────────┐
//! MarsSession 0 ◄─│              │
//! MarsSession 1 ◄─│ demux task   │◄─ transport
//! MarsSession N ◄─│              │
//!                 └──────────────┘
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TdsError};
use crate::protocol::{smp_flags, Packet, SmpHeader, DEFAULT_SMP_WINDOW, SMP_HEADER_SIZE};
use crate::transport::BoxedTransport;
use crate::writer::{spawn_writer_task, OutboundPacket, WriterConfig, WriterHandle};

/// Inbound payloads buffered per session before the demux task waits.
const INBOUND_CAPACITY: usize = 64;

type Routes = Arc<Mutex<HashMap<u16, mpsc::Sender<Bytes>>>>;

/// A physical connection carrying MARS sessions.
pub struct MarsConnection {
    writer: WriterHandle,
    routes: Routes,
    next_session_id: AtomicU16,
    shutdown: CancellationToken,
}

impl MarsConnection {
    /// Take over `transport` and start the writer and demux tasks.
    pub fn start(transport: BoxedTransport, config: WriterConfig) -> Arc<Self> {
        let (reader, writer) = tokio::io::split(transport);
        let (writer, _task) = spawn_writer_task(writer, config);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(demux_loop(reader, routes.clone(), shutdown.clone()));

        Arc::new(Self {
            writer,
            routes,
            next_session_id: AtomicU16::new(0),
            shutdown,
        })
    }

    /// Open a new logical session (sends SYN).
    pub async fn open_session(self: &Arc<Self>) -> Result<MarsSession> {
        if self.shutdown.is_cancelled() || self.writer.is_closed() {
            return Err(TdsError::ConnectionClosed);
        }

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let session_id = self.allocate_session_id(tx)?;

        let session = MarsSession {
            session_id,
            sequence: 0,
            received: 0,
            last_acked: 0,
            writer: self.writer.clone(),
            inbound: rx,
            connection: self.clone(),
            closed: false,
        };
        // Dropping the session on failure removes its route
        session.send_control(smp_flags::SYN).await?;

        tracing::debug!(session_id, "Opened MARS session");
        Ok(session)
    }

    /// Claim the next free session id and route it to `tx`.
    ///
    /// Ids wrap at `u16::MAX`; ids still routed are skipped.
    fn allocate_session_id(&self, tx: mpsc::Sender<Bytes>) -> Result<u16> {
        let mut routes = self.routes.lock();
        for _ in 0..=u16::MAX as u32 {
            let candidate = self.next_session_id.fetch_add(1, Ordering::AcqRel);
            if let Entry::Vacant(slot) = routes.entry(candidate) {
                slot.insert(tx);
                return Ok(candidate);
            }
        }
        Err(TdsError::Protocol(
            "No free MARS session id on this connection".into(),
        ))
    }

    /// Number of sessions currently routed.
    pub fn session_count(&self) -> usize {
        self.routes.lock().len()
    }

    fn remove_route(&self, session_id: u16) {
        self.routes.lock().remove(&session_id);
    }
}

impl Drop for MarsConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for MarsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarsConnection")
            .field("sessions", &self.session_count())
            .finish()
    }
}

/// One logical session on a [`MarsConnection`].
pub struct MarsSession {
    session_id: u16,
    sequence: u32,
    received: u32,
    last_acked: u32,
    writer: WriterHandle,
    inbound: mpsc::Receiver<Bytes>,
    connection: Arc<MarsConnection>,
    closed: bool,
}

impl MarsSession {
    /// Session id, unique on the physical connection.
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// The connection this session lives on.
    pub fn connection(&self) -> &Arc<MarsConnection> {
        &self.connection
    }

    /// Receive window advertised to the server.
    fn window(&self) -> u32 {
        self.received.wrapping_add(DEFAULT_SMP_WINDOW)
    }

    /// Send one TDS packet wrapped in an SMP DATA header.
    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        self.sequence = self.sequence.wrapping_add(1);
        let smp = SmpHeader::data(self.session_id, packet.size(), self.sequence, self.window());

        let mut header = BytesMut::with_capacity(SMP_HEADER_SIZE + crate::protocol::HEADER_SIZE);
        header.extend_from_slice(&smp.encode());
        header.extend_from_slice(&packet.header.encode());
        self.writer
            .send(OutboundPacket::new(header.freeze(), packet.payload.clone()))
            .await
    }

    /// Receive the next DATA payload routed to this session.
    pub async fn recv(&mut self) -> Result<Bytes> {
        let payload = self.inbound.recv().await.ok_or(TdsError::ConnectionClosed)?;
        self.received = self.received.wrapping_add(1);

        if self.received.wrapping_sub(self.last_acked) >= DEFAULT_SMP_WINDOW / 2 {
            self.send_control(smp_flags::ACK).await?;
            self.last_acked = self.received;
        }
        Ok(payload)
    }

    async fn send_control(&self, flags: u8) -> Result<()> {
        let smp = SmpHeader::control(flags, self.session_id, self.sequence, self.window());
        self.writer
            .send(OutboundPacket::new(
                Bytes::copy_from_slice(&smp.encode()),
                Bytes::new(),
            ))
            .await
    }

    /// Close the session (sends FIN). Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connection.remove_route(self.session_id);
        self.send_control(smp_flags::FIN).await
    }
}

impl Drop for MarsSession {
    fn drop(&mut self) {
        self.connection.remove_route(self.session_id);
    }
}

impl std::fmt::Debug for MarsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarsSession")
            .field("session_id", &self.session_id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Route inbound SMP packets to their sessions until EOF or shutdown.
async fn demux_loop<R>(mut reader: R, routes: Routes, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(8192);

    'outer: loop {
        loop {
            let header = match SmpHeader::decode(&buf) {
                Ok(Some(header)) if buf.len() >= header.length as usize => header,
                Ok(_) => break,
                Err(e) => {
                    tracing::error!("MARS demultiplexer stopped: {}", e);
                    break 'outer;
                }
            };

            let mut frame = buf.split_to(header.length as usize);
            let payload = frame.split_off(SMP_HEADER_SIZE).freeze();
            dispatch(&routes, header, payload).await;
        }

        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("MARS connection read failed: {}", e);
                break;
            }
        }
    }

    // Dropping the senders wakes every session with ConnectionClosed
    routes.lock().clear();
}

async fn dispatch(routes: &Routes, header: SmpHeader, payload: Bytes) {
    let session_id = header.session_id;

    if header.has_flag(smp_flags::FIN) {
        tracing::debug!(session_id, "Server closed MARS session");
        routes.lock().remove(&session_id);
        return;
    }

    if header.has_flag(smp_flags::DATA) {
        let tx = routes.lock().get(&session_id).cloned();
        match tx {
            Some(tx) => {
                if tx.send(payload).await.is_err() {
                    routes.lock().remove(&session_id);
                }
            }
            None => tracing::warn!(session_id, "Dropping SMP DATA for unknown session"),
        }
        return;
    }

    if header.has_flag(smp_flags::ACK) {
        tracing::trace!(session_id, window = header.window, "SMP window update");
        return;
    }

    tracing::warn!(session_id, flags = header.flags, "Unexpected SMP packet");
}
