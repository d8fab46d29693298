//! Length-prefix framing.

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::error::CodecError;
use crate::protocol::varint::{peek_varint, write_varint};

/// Largest frame the protocol can express with a three-byte length.
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// Split one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` without touching `buf` when the length prefix or the
/// frame body is still incomplete.
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
    let Some((length, header_len)) = peek_varint(&buf[..])? else {
        return Ok(None);
    };
    if length < 0 || length as usize > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(i64::from(length)));
    }
    let length = length as usize;
    if buf.len() < header_len + length {
        return Ok(None);
    }
    buf.advance(header_len);
    Ok(Some(buf.split_to(length).freeze()))
}

/// Append `body` with its length prefix.
pub fn write_frame(body: &[u8], out: &mut BytesMut) -> Result<(), CodecError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(body.len() as i64));
    }
    out.reserve(body.len() + 3);
    write_varint(out, body.len() as i32);
    out.extend_from_slice(body);
    Ok(())
}
