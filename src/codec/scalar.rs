//! Little-endian scalar encoding.
//!
//! Floats and doubles are written through their raw bit patterns so NaN
//! payloads, infinities and signed zeros survive a round trip unchanged.

use super::ensure_len;
use crate::error::{Result, TdsError};

/// Encoded size of an `f32`.
pub const FLOAT_SIZE: usize = 4;

/// Encoded size of an `f64`.
pub const DOUBLE_SIZE: usize = 8;

macro_rules! le_codec {
    ($encode:ident, $decode:ident, $ty:ty) => {
        #[doc = concat!("Encode a `", stringify!($ty), "` little-endian into the start of `dst`.")]
        #[inline]
        pub fn $encode(value: $ty, dst: &mut [u8]) -> Result<usize> {
            const SIZE: usize = std::mem::size_of::<$ty>();
            ensure_len(dst, SIZE)?;
            dst[..SIZE].copy_from_slice(&value.to_le_bytes());
            Ok(SIZE)
        }

        #[doc = concat!("Decode a little-endian `", stringify!($ty), "` from the start of `src`.")]
        #[inline]
        pub fn $decode(src: &[u8]) -> Result<$ty> {
            const SIZE: usize = std::mem::size_of::<$ty>();
            ensure_len(src, SIZE)?;
            let mut raw = [0u8; SIZE];
            raw.copy_from_slice(&src[..SIZE]);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

le_codec!(encode_i16, decode_i16, i16);
le_codec!(encode_u16, decode_u16, u16);
le_codec!(encode_i32, decode_i32, i32);
le_codec!(encode_u32, decode_u32, u32);
le_codec!(encode_i64, decode_i64, i64);
le_codec!(encode_u64, decode_u64, u64);

/// Encode an `f32` as 4 little-endian bytes.
///
/// Returns the number of bytes written.
#[inline]
pub fn encode_float(value: f32, dst: &mut [u8]) -> Result<usize> {
    encode_u32(value.to_bits(), dst)
}

/// Decode an `f32` from 4 little-endian bytes.
#[inline]
pub fn decode_float(src: &[u8]) -> Result<f32> {
    decode_u32(src).map(f32::from_bits)
}

/// Encode an `f64` as 8 little-endian bytes.
///
/// Returns the number of bytes written.
#[inline]
pub fn encode_double(value: f64, dst: &mut [u8]) -> Result<usize> {
    encode_u64(value.to_bits(), dst)
}

/// Decode an `f64` from 8 little-endian bytes.
#[inline]
pub fn decode_double(src: &[u8]) -> Result<f64> {
    decode_u64(src).map(f64::from_bits)
}

/// Write the low `len` bytes of `value`, little-endian.
///
/// Used by the date/time encodings, which store 3, 5 or 6 byte integers.
/// `len` must not exceed 8.
pub fn write_partial_i64(value: i64, len: usize, dst: &mut [u8]) -> Result<usize> {
    if len > DOUBLE_SIZE {
        return Err(TdsError::Protocol(format!(
            "partial integer length {} exceeds 8 bytes",
            len
        )));
    }
    ensure_len(dst, len)?;
    dst[..len].copy_from_slice(&value.to_le_bytes()[..len]);
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_double_layout() {
        let mut buf = [0u8; DOUBLE_SIZE];
        encode_double(1.0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
    }

    #[test]
    fn test_float_layout() {
        let mut buf = [0u8; FLOAT_SIZE];
        encode_float(-2.5, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0x20, 0xC0]);
    }

    #[test]
    fn test_special_values_keep_bits() {
        let specials = [
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            0.0,
            -0.0,
            f64::from_bits(0x7FF0_0000_0000_0001),
        ];
        let mut buf = [0u8; DOUBLE_SIZE];
        for value in specials {
            encode_double(value, &mut buf).unwrap();
            assert_eq!(decode_double(&buf).unwrap().to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_short_buffers_rejected() {
        let mut small = [0u8; 3];
        assert!(matches!(
            encode_float(1.0, &mut small),
            Err(TdsError::InsufficientBuffer {
                needed: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            decode_double(&small),
            Err(TdsError::InsufficientBuffer { needed: 8, .. })
        ));
    }

    #[test]
    fn test_writes_only_prefix() {
        let mut buf = [0xAAu8; 6];
        assert_eq!(encode_u16(0x0102, &mut buf).unwrap(), 2);
        assert_eq!(buf, [0x02, 0x01, 0xAA, 0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn test_partial_i64() {
        let mut buf = [0u8; 8];
        assert_eq!(write_partial_i64(0x0102_0304_0506, 5, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &[0x06, 0x05, 0x04, 0x03, 0x02]);
        assert_eq!(buf[5], 0);
        assert!(write_partial_i64(1, 9, &mut buf).is_err());
    }

    proptest! {
        #[test]
        fn prop_double_bits_preserved(bits in any::<u64>()) {
            let value = f64::from_bits(bits);
            let mut buf = [0u8; DOUBLE_SIZE];
            encode_double(value, &mut buf).unwrap();
            prop_assert_eq!(decode_double(&buf).unwrap().to_bits(), bits);
        }

        #[test]
        fn prop_float_bits_preserved(bits in any::<u32>()) {
            let value = f32::from_bits(bits);
            let mut buf = [0u8; FLOAT_SIZE];
            encode_float(value, &mut buf).unwrap();
            prop_assert_eq!(decode_float(&buf).unwrap().to_bits(), bits);
        }
    }
}
