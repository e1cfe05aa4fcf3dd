//! SMP (session multiplexing) header used by MARS.
//!
//! ```text
//! ┌──────┬───────┬────────┬──────────┬──────────┬──────────┐
//! │ SMID │ Flags │ SID    │ Length   │ SeqNum   │ Window   │
//! │ u8   │ u8    │ u16 LE │ u32 LE   │ u32 LE   │ u32 LE   │
//! └──────┴───────┴────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! The length includes the 16-byte header. Every MARS payload, including
//! the TDS packets of a child session, is wrapped in one of these.

use crate::codec::{decode_u16, decode_u32, encode_u16, encode_u32};
use crate::error::{Result, TdsError};

/// SMP header size in bytes.
pub const SMP_HEADER_SIZE: usize = 16;

/// SMP identifier byte.
pub const SMID: u8 = 0x53;

/// Receive window advertised by a new session, in packets.
pub const DEFAULT_SMP_WINDOW: u32 = 4;

/// SMP flag constants.
pub mod smp_flags {
    /// Open a session.
    pub const SYN: u8 = 0x01;
    /// Window update.
    pub const ACK: u8 = 0x02;
    /// Close a session.
    pub const FIN: u8 = 0x04;
    /// Carries payload.
    pub const DATA: u8 = 0x08;
}

/// Decoded SMP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpHeader {
    pub flags: u8,
    pub session_id: u16,
    /// Total length, header included.
    pub length: u32,
    pub sequence: u32,
    pub window: u32,
}

impl SmpHeader {
    /// Header for a DATA packet carrying `payload_len` bytes.
    pub fn data(session_id: u16, payload_len: usize, sequence: u32, window: u32) -> Self {
        Self {
            flags: smp_flags::DATA,
            session_id,
            length: (SMP_HEADER_SIZE + payload_len) as u32,
            sequence,
            window,
        }
    }

    /// Header-only control packet (SYN, ACK, FIN).
    pub fn control(flags: u8, session_id: u16, sequence: u32, window: u32) -> Self {
        Self {
            flags,
            session_id,
            length: SMP_HEADER_SIZE as u32,
            sequence,
            window,
        }
    }

    /// Encode to bytes.
    pub fn encode(&self) -> [u8; SMP_HEADER_SIZE] {
        let mut buf = [0u8; SMP_HEADER_SIZE];
        buf[0] = SMID;
        buf[1] = self.flags;
        // Fixed-size buffer, cannot fail
        let _ = encode_u16(self.session_id, &mut buf[2..4]);
        let _ = encode_u32(self.length, &mut buf[4..8]);
        let _ = encode_u32(self.sequence, &mut buf[8..12]);
        let _ = encode_u32(self.window, &mut buf[12..16]);
        buf
    }

    /// Decode from bytes. `Ok(None)` if fewer than 16 bytes are available.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < SMP_HEADER_SIZE {
            return Ok(None);
        }
        if buf[0] != SMID {
            return Err(TdsError::Protocol(format!(
                "Invalid SMP identifier {:#04x}",
                buf[0]
            )));
        }
        let header = Self {
            flags: buf[1],
            session_id: decode_u16(&buf[2..4])?,
            length: decode_u32(&buf[4..8])?,
            sequence: decode_u32(&buf[8..12])?,
            window: decode_u32(&buf[12..16])?,
        };
        if (header.length as usize) < SMP_HEADER_SIZE {
            return Err(TdsError::Protocol(format!(
                "SMP length {} is shorter than the header",
                header.length
            )));
        }
        Ok(Some(header))
    }

    /// Payload length (total minus header).
    #[inline]
    pub fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(SMP_HEADER_SIZE)
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_header_layout() {
        let header = SmpHeader::data(3, 100, 7, 11);
        let bytes = header.encode();
        assert_eq!(bytes[0], SMID);
        assert_eq!(bytes[1], smp_flags::DATA);
        assert_eq!(&bytes[2..4], &[3, 0]);
        assert_eq!(&bytes[4..8], &[116, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[7, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[11, 0, 0, 0]);
        assert_eq!(SmpHeader::decode(&bytes).unwrap(), Some(header));
    }

    #[test]
    fn test_control_header() {
        let header = SmpHeader::control(smp_flags::SYN, 1, 0, DEFAULT_SMP_WINDOW);
        assert_eq!(header.payload_length(), 0);
        assert!(header.has_flag(smp_flags::SYN));
        assert!(!header.has_flag(smp_flags::DATA));
    }

    #[test]
    fn test_decode_rejects_bad_smid() {
        let mut bytes = SmpHeader::data(1, 0, 1, 4).encode();
        bytes[0] = 0x12;
        assert!(matches!(SmpHeader::decode(&bytes), Err(TdsError::Protocol(_))));
    }

    #[test]
    fn test_decode_short() {
        assert_eq!(SmpHeader::decode(&[SMID; 10]).unwrap(), None);
    }
}
