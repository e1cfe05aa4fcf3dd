//! Codec module - fixed-width value encoding for the TDS wire.
//!
//! Every multi-byte scalar on the TDS wire is little-endian. GUIDs use the
//! mixed-endian layout (first three fields little-endian, last eight bytes
//! as-is).
//!
//! - [`scalar`] - integers, `f32`, `f64`, partial-width integers
//! - [`guid`] - GUID encoding on top of [`uuid::Uuid`]
//!
//! # Design
//!
//! All functions write into a caller-supplied slice and fail with
//! [`TdsError::InsufficientBuffer`](crate::error::TdsError::InsufficientBuffer)
//! instead of panicking when the slice is too short. There is exactly one
//! implementation; packet framing, the output stream and the session all call
//! into it.
//!
//! # Example
//!
//! ```
//! use tds_client_core::codec::{decode_double, encode_double, DOUBLE_SIZE};
//!
//! let mut buf = [0u8; DOUBLE_SIZE];
//! encode_double(1.5, &mut buf).unwrap();
//! assert_eq!(decode_double(&buf).unwrap(), 1.5);
//! ```

mod guid;
mod scalar;

pub use guid::{decode_guid, encode_guid, GUID_SIZE};
pub use scalar::{
    decode_double, decode_float, decode_i16, decode_i32, decode_i64, decode_u16, decode_u32,
    decode_u64, encode_double, encode_float, encode_i16, encode_i32, encode_i64, encode_u16,
    encode_u32, encode_u64, write_partial_i64, DOUBLE_SIZE, FLOAT_SIZE,
};

use crate::error::{Result, TdsError};

/// Check that `buf` holds at least `needed` bytes.
#[inline]
pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(TdsError::InsufficientBuffer {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}
