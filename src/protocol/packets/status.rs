//! STATUS state messages and the server list document.

use bytes::{Bytes, BytesMut, BufMut};
use serde::{Deserialize, Serialize};

use crate::protocol::buf::{ProtoRead, ProtoWrite, MAX_STRING_LEN};
use crate::protocol::error::CodecError;
use crate::protocol::packets::{empty_message, Message};

empty_message!(
    /// Asks for the server list document.
    StatusRequest
);

/// Server list document, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl Message for StatusResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { json: buf.read_string(MAX_STRING_LEN)? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.json);
    }
}

/// Latency probe; answered with a [`PongResponse`] carrying the same payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub payload: i64,
}

impl Message for PingRequest {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { payload: buf.read_i64_checked("ping payload")? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.payload);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongResponse {
    pub payload: i64,
}

impl Message for PongResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { payload: buf.read_i64_checked("pong payload")? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.payload);
    }
}

/// JSON body of a [`StatusResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: StatusDescription,
    #[serde(default)]
    pub enforces_secure_chat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: u32,
    pub online: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<StatusSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSample {
    pub name: String,
    pub id: uuid::Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDescription {
    pub text: String,
}
