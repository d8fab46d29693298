//! Field-level readers and writers on top of `bytes` buffers.

use bytes::{Buf, BufMut, Bytes};
use uuid::Uuid;

use crate::protocol::error::CodecError;
use crate::protocol::varint;

/// Default maximum length of a protocol string, in characters.
pub const MAX_STRING_LEN: usize = 32_767;

/// Reading helpers for packet bodies.
pub trait ProtoRead: Buf {
    fn read_varint(&mut self) -> Result<i32, CodecError>
    where
        Self: Sized,
    {
        varint::read_varint(self)
    }

    fn read_varlong(&mut self) -> Result<i64, CodecError>
    where
        Self: Sized,
    {
        varint::read_varlong(self)
    }

    fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8_checked("bool")? != 0)
    }

    fn read_u8_checked(&mut self, field: &'static str) -> Result<u8, CodecError> {
        if self.remaining() < 1 {
            return Err(CodecError::UnexpectedEof(field));
        }
        Ok(self.get_u8())
    }

    fn read_i8_checked(&mut self, field: &'static str) -> Result<i8, CodecError> {
        if self.remaining() < 1 {
            return Err(CodecError::UnexpectedEof(field));
        }
        Ok(self.get_i8())
    }

    fn read_u16_checked(&mut self, field: &'static str) -> Result<u16, CodecError> {
        if self.remaining() < 2 {
            return Err(CodecError::UnexpectedEof(field));
        }
        Ok(self.get_u16())
    }

    fn read_i64_checked(&mut self, field: &'static str) -> Result<i64, CodecError> {
        if self.remaining() < 8 {
            return Err(CodecError::UnexpectedEof(field));
        }
        Ok(self.get_i64())
    }

    fn read_uuid(&mut self) -> Result<Uuid, CodecError> {
        if self.remaining() < 16 {
            return Err(CodecError::UnexpectedEof("uuid"));
        }
        Ok(Uuid::from_u128(self.get_u128()))
    }

    /// Read a varint length followed by that many UTF-8 bytes.
    fn read_string(&mut self, max_chars: usize) -> Result<String, CodecError>
    where
        Self: Sized,
    {
        let length = self.read_varint()?;
        if length < 0 || length as usize > max_chars * 3 {
            return Err(CodecError::InvalidLength { field: "string", length });
        }
        let length = length as usize;
        if self.remaining() < length {
            return Err(CodecError::UnexpectedEof("string"));
        }
        let mut raw = vec![0u8; length];
        self.copy_to_slice(&mut raw);
        let value = String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
        let chars = value.chars().count();
        if chars > max_chars {
            return Err(CodecError::StringTooLong { length: chars, max: max_chars });
        }
        Ok(value)
    }

    /// Read a varint length followed by that many raw bytes.
    fn read_byte_array(&mut self, max_len: usize) -> Result<Bytes, CodecError>
    where
        Self: Sized,
    {
        let length = self.read_varint()?;
        if length < 0 || length as usize > max_len {
            return Err(CodecError::InvalidLength { field: "byte array", length });
        }
        let length = length as usize;
        if self.remaining() < length {
            return Err(CodecError::UnexpectedEof("byte array"));
        }
        Ok(self.copy_to_bytes(length))
    }

    /// Take everything left in the buffer.
    fn read_remaining(&mut self) -> Bytes {
        let remaining = self.remaining();
        self.copy_to_bytes(remaining)
    }
}

impl<B: Buf> ProtoRead for B {}

/// Writing helpers for packet bodies.
pub trait ProtoWrite: BufMut {
    fn write_varint(&mut self, value: i32)
    where
        Self: Sized,
    {
        varint::write_varint(self, value);
    }

    fn write_varlong(&mut self, value: i64)
    where
        Self: Sized,
    {
        varint::write_varlong(self, value);
    }

    fn write_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    fn write_uuid(&mut self, value: &Uuid) {
        self.put_u128(value.as_u128());
    }

    fn write_string(&mut self, value: &str)
    where
        Self: Sized,
    {
        self.write_varint(value.len() as i32);
        self.put_slice(value.as_bytes());
    }

    fn write_byte_array(&mut self, value: &[u8])
    where
        Self: Sized,
    {
        self.write_varint(value.len() as i32);
        self.put_slice(value);
    }
}

impl<B: BufMut> ProtoWrite for B {}
