//! TDS packet and message types.
//!
//! A message (login, SQL batch, RPC, ...) travels as one or more packets.
//! Every packet but the last carries `status::NORMAL`; the last carries
//! `status::EOM`. Packet ids start at 1 and wrap at 255.
//!
//! # Example
//!
//! ```
//! use tds_client_core::protocol::{packet_type, split_message, HEADER_SIZE};
//!
//! let payload = vec![0u8; 1000];
//! let packets = split_message(packet_type::SQL_BATCH, &payload, 512, 1);
//! assert_eq!(packets.len(), 3);
//! assert!(packets[2].is_end_of_message());
//! assert_eq!(packets[0].payload_len(), 512 - HEADER_SIZE);
//! ```

use bytes::Bytes;

use super::wire_format::{status, PacketHeader, HEADER_SIZE};

/// A single TDS packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Decoded header.
    pub header: PacketHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet from header and payload.
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the packet type.
    #[inline]
    pub fn packet_type(&self) -> u8 {
        self.header.packet_type
    }

    /// Get the packet id.
    #[inline]
    pub fn packet_id(&self) -> u8 {
        self.header.packet_id
    }

    /// Check if this is the last packet of its message.
    #[inline]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }

    /// Total size on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// A complete message reassembled from one or more packets.
#[derive(Debug, Clone)]
pub struct Message {
    /// Packet type shared by all packets of the message.
    pub packet_type: u8,
    /// Status bits of the first packet.
    pub status: u8,
    /// Concatenated payload.
    pub payload: Bytes,
}

impl Message {
    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Next packet id after `id`, wrapping from 255 back to 0.
#[inline]
pub fn next_packet_id(id: u8) -> u8 {
    id.wrapping_add(1)
}

/// Split a message payload into packets of at most `packet_size` bytes.
///
/// An empty payload still produces a single EOM packet.
pub fn split_message(
    packet_type: u8,
    payload: &[u8],
    packet_size: usize,
    first_packet_id: u8,
) -> Vec<Packet> {
    let capacity = packet_size.saturating_sub(HEADER_SIZE).max(1);
    let mut packets = Vec::with_capacity(payload.len() / capacity + 1);
    let mut packet_id = first_packet_id;

    let mut chunks = payload.chunks(capacity).peekable();
    if chunks.peek().is_none() {
        let header = PacketHeader::new(packet_type, status::EOM, 0, packet_id);
        packets.push(Packet::new(header, Bytes::new()));
        return packets;
    }

    while let Some(chunk) = chunks.next() {
        let status = if chunks.peek().is_none() {
            status::EOM
        } else {
            status::NORMAL
        };
        let header = PacketHeader::new(packet_type, status, chunk.len(), packet_id);
        packets.push(Packet::new(header, Bytes::copy_from_slice(chunk)));
        packet_id = next_packet_id(packet_id);
    }

    packets
}
