//! The single message of the HANDSHAKE state.

use bytes::{Bytes, BytesMut, BufMut};

use crate::protocol::buf::{ProtoRead, ProtoWrite, MAX_STRING_LEN};
use crate::protocol::error::CodecError;
use crate::protocol::packets::Message;

/// Opening message of every connection; picks STATUS or LOGIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub intent: i32,
}

impl Handshake {
    pub const INTENT_STATUS: i32 = 1;
    pub const INTENT_LOGIN: i32 = 2;
    pub const INTENT_TRANSFER: i32 = 3;
}

impl Message for Handshake {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            protocol_version: buf.read_varint()?,
            // Forwarding payloads ride along in the address, so allow the long form here.
            server_address: buf.read_string(MAX_STRING_LEN)?,
            server_port: buf.read_u16_checked("server port")?,
            intent: buf.read_varint()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_varint(self.protocol_version);
        buf.write_string(&self.server_address);
        buf.put_u16(self.server_port);
        buf.write_varint(self.intent);
    }
}
