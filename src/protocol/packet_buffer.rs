//! Packet buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented packets:
//! - `WaitingForHeader`: Need at least 8 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! [`MessageAssembler`] sits on top and concatenates packet payloads until
//! the EOM packet arrives.
//!
//! # Example
//!
//! ```
//! use tds_client_core::protocol::{packet_type, split_message, PacketBuffer, MessageAssembler};
//!
//! let mut wire = Vec::new();
//! for packet in split_message(packet_type::TABULAR_RESULT, &[9u8; 700], 512, 1) {
//!     wire.extend(packet.to_bytes());
//! }
//!
//! let mut buffer = PacketBuffer::new(512);
//! let mut assembler = MessageAssembler::new();
//! let mut messages = Vec::new();
//! for packet in buffer.push(&wire).unwrap() {
//!     if let Some(message) = assembler.push(packet).unwrap() {
//!         messages.push(message);
//!     }
//! }
//! assert_eq!(messages.len(), 1);
//! assert_eq!(messages[0].payload.len(), 700);
//! ```

use bytes::{Bytes, BytesMut};

use super::packet::{Message, Packet};
use super::wire_format::{PacketHeader, HEADER_SIZE};
use crate::error::{Result, TdsError};

/// State machine for packet parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 8 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: PacketHeader, remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete packets.
pub struct PacketBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Negotiated packet size; longer packets are rejected.
    packet_size: usize,
}

impl PacketBuffer {
    /// Create a new packet buffer for the given packet size.
    pub fn new(packet_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(packet_size * 2),
            state: State::WaitingForHeader,
            packet_size,
        }
    }

    /// Update the packet size after login negotiation.
    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.packet_size = packet_size;
    }

    /// Push data into the buffer and extract all complete packets.
    ///
    /// If data is fragmented, partial data is buffered internally for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns error if a header is malformed or exceeds the packet size.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.try_extract_one()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    fn try_extract_one(&mut self) -> Result<Option<Packet>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let header = match PacketHeader::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    header.validate(self.packet_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);

                    let remaining = header.payload_length();
                    if remaining == 0 {
                        return Ok(Some(Packet::new(header, Bytes::new())));
                    }
                    self.state = State::WaitingForPayload { header, remaining };
                }

                State::WaitingForPayload { header, remaining } => {
                    let remaining = *remaining;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining).freeze();
                    let header = *header;
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Packet::new(header, payload)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

/// Concatenates packet payloads into messages.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    current: Option<(u8, u8, BytesMut)>,
}

impl MessageAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet. Returns the message once its EOM packet arrives.
    ///
    /// # Errors
    ///
    /// Fails if a packet of a different type interrupts a message.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Message>> {
        let eom = packet.is_end_of_message();
        let (packet_type, status, payload) = match self.current.take() {
            None => {
                if eom {
                    return Ok(Some(Message {
                        packet_type: packet.header.packet_type,
                        status: packet.header.status,
                        payload: packet.payload,
                    }));
                }
                let mut payload = BytesMut::with_capacity(packet.payload_len() * 2);
                payload.extend_from_slice(&packet.payload);
                (packet.header.packet_type, packet.header.status, payload)
            }
            Some((packet_type, status, mut payload)) => {
                if packet.header.packet_type != packet_type {
                    return Err(TdsError::Protocol(format!(
                        "Packet type {:#04x} interrupted message of type {:#04x}",
                        packet.header.packet_type, packet_type
                    )));
                }
                payload.extend_from_slice(&packet.payload);
                (packet_type, status, payload)
            }
        };

        if eom {
            return Ok(Some(Message {
                packet_type,
                status,
                payload: payload.freeze(),
            }));
        }
        self.current = Some((packet_type, status, payload));
        Ok(None)
    }

    /// True while a message is partially assembled.
    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{packet_type, split_message, status, DEFAULT_PACKET_SIZE};

    fn make_packet_bytes(packet_type: u8, status: u8, payload: &[u8]) -> Vec<u8> {
        let header = PacketHeader::new(packet_type, status, payload.len(), 1);
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_single_complete_packet() {
        let mut buffer = PacketBuffer::new(DEFAULT_PACKET_SIZE);
        let bytes = make_packet_bytes(packet_type::TABULAR_RESULT, status::EOM, b"hello");

        let packets = buffer.push(&bytes).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = PacketBuffer::new(DEFAULT_PACKET_SIZE);
        let bytes = make_packet_bytes(packet_type::TABULAR_RESULT, status::EOM, b"test");

        assert!(buffer.push(&bytes[..5]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let packets = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = PacketBuffer::new(DEFAULT_PACKET_SIZE);
        let payload = b"this payload arrives in two separate reads";
        let bytes = make_packet_bytes(packet_type::TABULAR_RESULT, status::EOM, payload);

        let split = HEADER_SIZE + 10;
        assert!(buffer.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let packets = buffer.push(&bytes[split..]).unwrap();
        assert_eq!(packets[0].payload(), payload);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = PacketBuffer::new(DEFAULT_PACKET_SIZE);
        let bytes = make_packet_bytes(packet_type::PRELOGIN, status::EOM, b"hi");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload(), b"hi");
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let mut buffer = PacketBuffer::new(512);
        let header = PacketHeader::new(packet_type::TABULAR_RESULT, status::EOM, 1000, 1);
        let result = buffer.push(&header.encode());
        assert!(matches!(result, Err(TdsError::Protocol(_))));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = PacketBuffer::new(DEFAULT_PACKET_SIZE);
        let bytes = make_packet_bytes(packet_type::TABULAR_RESULT, status::EOM, b"test");
        buffer.push(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_assemble_multi_packet_message() {
        let payload: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
        let mut wire = Vec::new();
        for packet in split_message(packet_type::TABULAR_RESULT, &payload, 512, 1) {
            wire.extend(packet.to_bytes());
        }

        let mut buffer = PacketBuffer::new(512);
        let mut assembler = MessageAssembler::new();
        let mut messages = Vec::new();
        for chunk in wire.chunks(100) {
            for packet in buffer.push(chunk).unwrap() {
                if let Some(message) = assembler.push(packet).unwrap() {
                    messages.push(message);
                }
            }
        }

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload(), &payload[..]);
        assert!(!assembler.is_pending());
    }

    #[test]
    fn test_interleaved_type_rejected() {
        let mut assembler = MessageAssembler::new();
        let first = Packet::new(
            PacketHeader::new(packet_type::TABULAR_RESULT, status::NORMAL, 1, 1),
            Bytes::from_static(b"a"),
        );
        let second = Packet::new(
            PacketHeader::new(packet_type::PRELOGIN, status::EOM, 1, 2),
            Bytes::from_static(b"b"),
        );
        assert!(assembler.push(first).unwrap().is_none());
        assert!(assembler.is_pending());
        assert!(assembler.push(second).is_err());
    }
}
