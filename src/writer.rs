//! Dedicated writer task for the asynchronous-write path.
//!
//! A session in async-write mode does not write to its transport directly.
//! It hands encoded packets to a writer task through an mpsc channel; the task
//! batches whatever is ready into a single vectored write. MARS child
//! sessions share one writer per physical connection.
//!
//! # Architecture
//!
//! ```text
//! Session 1 ─┐
//! Session 2 ─┼─► mpsc::Sender<OutboundPacket> ─► Writer Task ─► Transport
//! Session N ─┘
//! ```
//!
//! Backpressure is a pending-packet count shared between the handles and the
//! task. A sender waits while the count is at the limit and gives up with
//! [`TdsError::BackpressureTimeout`] after the configured timeout.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Result, TdsError};
use crate::protocol::Packet;

/// Default maximum pending packets before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum packets to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Interval between backpressure checks.
const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// A packet ready to be written to the transport.
///
/// `header` is every byte that precedes the payload: the 8-byte TDS header,
/// or the SMP header followed by the TDS header for a MARS session.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    /// Pre-encoded header bytes.
    pub header: Bytes,
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundPacket {
    /// Create an outbound packet from raw header and payload bytes.
    #[inline]
    pub fn new(header: Bytes, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create an outbound packet from a TDS packet.
    #[inline]
    pub fn from_packet(packet: &Packet) -> Self {
        Self {
            header: Bytes::copy_from_slice(&packet.header.encode()),
            payload: packet.payload.clone(),
        }
    }

    /// Total size of this packet (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        self.header.len() + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum pending packets before backpressure kicks in.
    pub max_pending_packets: usize,
    /// Channel capacity for the packet queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    #[serde(with = "crate::config::duration_ms")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending packets to the writer task.
///
/// Cheaply cloneable; MARS sessions on one connection share clones of it.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundPacket>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundPacket>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Send a packet to the writer task.
    ///
    /// Waits while backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, packet: OutboundPacket) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Count before sending so the task never decrements below zero
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(packet).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            TdsError::ConnectionClosed
        })
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                tracing::warn!(
                    pending = self.pending.load(Ordering::Acquire),
                    "Writer backpressure did not clear in {:?}",
                    self.timeout
                );
                return Err(TdsError::BackpressureTimeout);
            }
            tokio::time::sleep(CHECK_INTERVAL).await;
        }
    }

    /// True once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("pending", &self.pending.load(Ordering::Acquire))
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

/// Spawn the writer task and return a handle for sending packets.
///
/// The returned `JoinHandle` resolves when every handle has been dropped or
/// the transport fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_packets,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer, pending).await;
        if let Err(e) = &result {
            tracing::error!("TDS writer task failed: {}", e);
        }
        result
    });

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundPacket>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(p) => p,
            None => {
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(packet) => batch.push(packet),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;
        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of packets using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundPacket]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|p| p.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(TdsError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[OutboundPacket], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for packet in batch {
        for part in [&packet.header, &packet.payload] {
            if part.is_empty() {
                continue;
            }
            let end = offset + part.len();
            if skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
