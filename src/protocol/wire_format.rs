//! TDS packet header encoding and decoding.
//!
//! Implements the 8-byte packet header:
//! ```text
//! ┌──────┬────────┬──────────┬──────────┬───────────┬────────┐
//! │ Type │ Status │ Length   │ SPID     │ Packet ID │ Window │
//! │ u8   │ u8     │ u16 BE   │ u16 BE   │ u8        │ u8     │
//! └──────┴────────┴──────────┴──────────┴───────────┴────────┘
//! ```
//!
//! The length and SPID fields are the only big-endian values in TDS; the
//! length covers the header itself.

use crate::error::{Result, TdsError};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default negotiated packet size.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Smallest packet size a server will accept.
pub const MIN_PACKET_SIZE: usize = 512;

/// Largest packet size expressible in the length field.
pub const MAX_PACKET_SIZE: usize = 32767;

/// Packet type constants.
pub mod packet_type {
    /// SQL batch.
    pub const SQL_BATCH: u8 = 0x01;
    /// Pre-TDS7 login.
    pub const PRE_TDS7_LOGIN: u8 = 0x02;
    /// Remote procedure call.
    pub const RPC: u8 = 0x03;
    /// Tabular result (server to client).
    pub const TABULAR_RESULT: u8 = 0x04;
    /// Attention signal.
    pub const ATTENTION: u8 = 0x06;
    /// Bulk load data.
    pub const BULK_LOAD: u8 = 0x07;
    /// Federated authentication token.
    pub const FEDAUTH_TOKEN: u8 = 0x08;
    /// Transaction manager request.
    pub const TRANSACTION_MANAGER: u8 = 0x0E;
    /// TDS7 login.
    pub const LOGIN7: u8 = 0x10;
    /// SSPI message.
    pub const SSPI: u8 = 0x11;
    /// Pre-login message.
    pub const PRELOGIN: u8 = 0x12;
}

/// Status bit constants.
pub mod status {
    /// Normal packet, more to follow.
    pub const NORMAL: u8 = 0x00;
    /// End of message: last packet of the message.
    pub const EOM: u8 = 0x01;
    /// Ignore this event (client to server).
    pub const IGNORE: u8 = 0x02;
    /// Reset connection before processing the request.
    pub const RESET_CONNECTION: u8 = 0x08;
    /// Reset connection, keeping transaction state.
    pub const RESET_CONNECTION_SKIP_TRAN: u8 = 0x10;

    /// Check if a specific status bit is set.
    #[inline]
    pub fn has_flag(status: u8, flag: u8) -> bool {
        status & flag != 0
    }
}

/// Decoded TDS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type (see [`packet_type`]).
    pub packet_type: u8,
    /// Status bits (see [`status`]).
    pub status: u8,
    /// Total packet length, header included.
    pub length: u16,
    /// Server process id (0 from the client).
    pub spid: u16,
    /// Packet number within the message, wraps at 255.
    pub packet_id: u8,
    /// Window, currently always 0.
    pub window: u8,
}

impl PacketHeader {
    /// Create a header for a packet carrying `payload_len` bytes.
    pub fn new(packet_type: u8, status: u8, payload_len: usize, packet_id: u8) -> Self {
        Self {
            packet_type,
            status,
            length: (HEADER_SIZE + payload_len) as u16,
            spid: 0,
            packet_id,
            window: 0,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use tds_client_core::protocol::{packet_type, status, PacketHeader};
    ///
    /// let header = PacketHeader::new(packet_type::SQL_BATCH, status::EOM, 4, 1);
    /// assert_eq!(header.encode(), [0x01, 0x01, 0x00, 0x0C, 0x00, 0x00, 0x01, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.packet_type;
        buf[1] = self.status;
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.spid.to_be_bytes());
        buf[6] = self.packet_id;
        buf[7] = self.window;
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            packet_type: buf[0],
            status: buf[1],
            length: u16::from_be_bytes([buf[2], buf[3]]),
            spid: u16::from_be_bytes([buf[4], buf[5]]),
            packet_id: buf[6],
            window: buf[7],
        })
    }

    /// Validate the header against the negotiated packet size.
    ///
    /// Checks:
    /// - Length covers at least the header
    /// - Length does not exceed the packet size
    pub fn validate(&self, packet_size: usize) -> Result<()> {
        let length = self.length as usize;
        if length < HEADER_SIZE {
            return Err(TdsError::Protocol(format!(
                "Packet length {} is shorter than the header",
                length
            )));
        }
        if length > packet_size {
            return Err(TdsError::Protocol(format!(
                "Packet length {} exceeds packet size {}",
                length, packet_size
            )));
        }
        Ok(())
    }

    /// Payload length (total length minus header).
    #[inline]
    pub fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Check if this is the last packet of a message.
    #[inline]
    pub fn is_end_of_message(&self) -> bool {
        status::has_flag(self.status, status::EOM)
    }
}

/// Clamp a requested packet size into the range the protocol allows.
pub fn clamp_packet_size(requested: usize) -> usize {
    requested.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let header = PacketHeader {
            packet_type: packet_type::TABULAR_RESULT,
            status: status::EOM,
            length: 0x1234,
            spid: 0x0055,
            packet_id: 7,
            window: 0,
        };
        let bytes = header.encode();
        assert_eq!(bytes, [0x04, 0x01, 0x12, 0x34, 0x00, 0x55, 0x07, 0x00]);
        assert_eq!(PacketHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn test_decode_too_short() {
        assert!(PacketHeader::decode(&[0u8; 7]).is_none());
    }

    #[test]
    fn test_validate() {
        let ok = PacketHeader::new(packet_type::RPC, status::NORMAL, 100, 1);
        assert!(ok.validate(DEFAULT_PACKET_SIZE).is_ok());

        let mut short = ok;
        short.length = 4;
        assert!(short.validate(DEFAULT_PACKET_SIZE).is_err());

        let big = PacketHeader::new(packet_type::RPC, status::NORMAL, 5000, 1);
        assert!(big.validate(DEFAULT_PACKET_SIZE).is_err());
    }

    #[test]
    fn test_payload_length_and_eom() {
        let header = PacketHeader::new(packet_type::PRELOGIN, status::EOM, 42, 1);
        assert_eq!(header.payload_length(), 42);
        assert!(header.is_end_of_message());
        let header = PacketHeader::new(packet_type::PRELOGIN, status::NORMAL, 42, 1);
        assert!(!header.is_end_of_message());
    }

    #[test]
    fn test_clamp_packet_size() {
        assert_eq!(clamp_packet_size(10), MIN_PACKET_SIZE);
        assert_eq!(clamp_packet_size(8000), 8000);
        assert_eq!(clamp_packet_size(100_000), MAX_PACKET_SIZE);
    }
}
