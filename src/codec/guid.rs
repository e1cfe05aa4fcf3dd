//! GUID encoding.
//!
//! Layout (16 bytes):
//! ```text
//! ┌──────────┬─────────┬─────────┬──────────────┐
//! │ Data1    │ Data2   │ Data3   │ Data4        │
//! │ u32 LE   │ u16 LE  │ u16 LE  │ 8 bytes as-is│
//! └──────────┴─────────┴─────────┴──────────────┘
//! ```

use uuid::Uuid;

use super::ensure_len;
use crate::error::Result;

/// Encoded size of a GUID.
pub const GUID_SIZE: usize = 16;

/// Encode a GUID into the start of `dst` using the mixed-endian layout.
///
/// # Example
///
/// ```
/// use tds_client_core::codec::{encode_guid, GUID_SIZE};
/// use uuid::Uuid;
///
/// let guid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
/// let mut buf = [0u8; GUID_SIZE];
/// encode_guid(&guid, &mut buf).unwrap();
/// assert_eq!(&buf[..4], &[0x33, 0x22, 0x11, 0x00]);
/// ```
pub fn encode_guid(guid: &Uuid, dst: &mut [u8]) -> Result<usize> {
    ensure_len(dst, GUID_SIZE)?;
    let (data1, data2, data3, data4) = guid.as_fields();
    dst[0..4].copy_from_slice(&data1.to_le_bytes());
    dst[4..6].copy_from_slice(&data2.to_le_bytes());
    dst[6..8].copy_from_slice(&data3.to_le_bytes());
    dst[8..16].copy_from_slice(data4);
    Ok(GUID_SIZE)
}

/// Decode a GUID from the first 16 bytes of `src`.
pub fn decode_guid(src: &[u8]) -> Result<Uuid> {
    ensure_len(src, GUID_SIZE)?;
    let data1 = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    let data2 = u16::from_le_bytes([src[4], src[5]]);
    let data3 = u16::from_le_bytes([src[6], src[7]]);
    let mut data4 = [0u8; 8];
    data4.copy_from_slice(&src[8..16]);
    Ok(Uuid::from_fields(data1, data2, data3, &data4))
}
