//! Variable-length integer encoding.
//!
//! 7 data bits per byte, high bit set on every byte but the last, least
//! significant group first. Varints are capped at 5 bytes and varlongs at 10.

use bytes::{Buf, BufMut};

use crate::protocol::error::CodecError;

/// Maximum encoded size of a 32-bit varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Maximum encoded size of a 64-bit varlong.
pub const MAX_VARLONG_LEN: usize = 10;

/// Peek a varint at the start of `buf` without consuming anything.
///
/// Returns `Ok(None)` when the buffer ends before the varint does, which
/// lets the framing stage retry once more bytes have arrived.
pub fn peek_varint(buf: &[u8]) -> Result<Option<(i32, usize)>, CodecError> {
    let mut value: u32 = 0;
    for (i, byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(CodecError::VarIntTooLong(MAX_VARINT_LEN))
    } else {
        Ok(None)
    }
}

/// Read a varint, consuming it from `buf`.
pub fn read_varint<B: Buf>(buf: &mut B) -> Result<i32, CodecError> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(CodecError::UnexpectedEof("varint"));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(CodecError::VarIntTooLong(MAX_VARINT_LEN))
}

/// Read a varlong, consuming it from `buf`.
pub fn read_varlong<B: Buf>(buf: &mut B) -> Result<i64, CodecError> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARLONG_LEN {
        if !buf.has_remaining() {
            return Err(CodecError::UnexpectedEof("varlong"));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i64);
        }
    }
    Err(CodecError::VarIntTooLong(MAX_VARLONG_LEN))
}

/// Append `value` as a varint.
pub fn write_varint<B: BufMut>(buf: &mut B, value: i32) {
    let mut remaining = value as u32;
    loop {
        if remaining & !0x7F == 0 {
            buf.put_u8(remaining as u8);
            return;
        }
        buf.put_u8((remaining as u8 & 0x7F) | 0x80);
        remaining >>= 7;
    }
}

/// Append `value` as a varlong.
pub fn write_varlong<B: BufMut>(buf: &mut B, value: i64) {
    let mut remaining = value as u64;
    loop {
        if remaining & !0x7F == 0 {
            buf.put_u8(remaining as u8);
            return;
        }
        buf.put_u8((remaining as u8 & 0x7F) | 0x80);
        remaining >>= 7;
    }
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(value: i32) -> usize {
    let bits = 32 - (value as u32).leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, value);
        out
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(1), [0x01]);
        assert_eq!(encode(127), [0x7f]);
        assert_eq!(encode(128), [0x80, 0x01]);
        assert_eq!(encode(255), [0xff, 0x01]);
        assert_eq!(encode(25565), [0xdd, 0xc7, 0x01]);
        assert_eq!(encode(2_097_151), [0xff, 0xff, 0x7f]);
        assert_eq!(encode(i32::MAX), [0xff, 0xff, 0xff, 0xff, 0x07]);
        assert_eq!(encode(-1), [0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(encode(i32::MIN), [0x80, 0x80, 0x80, 0x80, 0x08]);
    }

    #[test]
    fn varint_round_trip_and_length() {
        for value in [0, 1, 2, 127, 128, 300, 16_383, 16_384, 2_097_151, 772, i32::MAX, -1, i32::MIN] {
            let bytes = encode(value);
            assert!(bytes.len() <= MAX_VARINT_LEN);
            assert_eq!(bytes.len(), varint_len(value), "length of {value}");
            assert_eq!(read_varint(&mut &bytes[..]).unwrap(), value);
            assert_eq!(peek_varint(&bytes).unwrap(), Some((value, bytes.len())));
        }
    }

    #[test]
    fn varlong_round_trip_and_length() {
        for value in [0i64, 1, 127, 128, i64::from(i32::MAX), i64::MAX, -1, i64::MIN] {
            let mut bytes = Vec::new();
            write_varlong(&mut bytes, value);
            assert!(bytes.len() <= MAX_VARLONG_LEN);
            assert_eq!(read_varlong(&mut &bytes[..]).unwrap(), value);
        }
        let mut bytes = Vec::new();
        write_varlong(&mut bytes, -1);
        assert_eq!(bytes.len(), MAX_VARLONG_LEN);
    }

    #[test]
    fn peek_incomplete_returns_none() {
        assert_eq!(peek_varint(&[]).unwrap(), None);
        assert_eq!(peek_varint(&[0x80]).unwrap(), None);
        assert_eq!(peek_varint(&[0xff, 0xff, 0xff, 0xff]).unwrap(), None);
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(matches!(peek_varint(&bytes), Err(CodecError::VarIntTooLong(5))));
        assert!(matches!(read_varint(&mut &bytes[..]), Err(CodecError::VarIntTooLong(5))));

        let long = [0xffu8; 11];
        assert!(matches!(read_varlong(&mut &long[..]), Err(CodecError::VarIntTooLong(10))));
    }

    #[test]
    fn truncated_read_is_eof() {
        assert!(matches!(
            read_varint(&mut &[0x80u8][..]),
            Err(CodecError::UnexpectedEof("varint"))
        ));
    }
}
