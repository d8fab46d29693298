//! LOGIN state messages.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::buf::{ProtoRead, ProtoWrite, MAX_STRING_LEN};
use crate::protocol::error::CodecError;
use crate::protocol::packets::{empty_message, Message};

/// Longest username the protocol allows.
pub const MAX_USERNAME_LEN: usize = 16;

/// Largest RSA envelope or DER key accepted in the key exchange.
const MAX_KEY_MATERIAL_LEN: usize = 1024;

/// Login start: claimed name and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub username: String,
    pub uuid: Uuid,
}

impl Message for Hello {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            username: buf.read_string(MAX_USERNAME_LEN)?,
            uuid: buf.read_uuid()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.username);
        buf.write_uuid(&self.uuid);
    }
}

/// Server half of the key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Bytes,
    pub verify_token: Bytes,
    pub should_authenticate: bool,
}

impl Message for EncryptionRequest {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            server_id: buf.read_string(20)?,
            public_key: buf.read_byte_array(MAX_KEY_MATERIAL_LEN)?,
            verify_token: buf.read_byte_array(MAX_KEY_MATERIAL_LEN)?,
            should_authenticate: buf.read_bool()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.server_id);
        buf.write_byte_array(&self.public_key);
        buf.write_byte_array(&self.verify_token);
        buf.write_bool(self.should_authenticate);
    }
}

/// Client half of the key exchange; both fields are RSA-encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Bytes,
    pub verify_token: Bytes,
}

impl Message for EncryptionResponse {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            shared_secret: buf.read_byte_array(MAX_KEY_MATERIAL_LEN)?,
            verify_token: buf.read_byte_array(MAX_KEY_MATERIAL_LEN)?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_byte_array(&self.shared_secret);
        buf.write_byte_array(&self.verify_token);
    }
}

/// Signed profile attribute (textures and the like).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Final LOGIN message from the server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
    pub properties: Vec<ProfileProperty>,
}

impl Message for LoginSuccess {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        let uuid = buf.read_uuid()?;
        let username = buf.read_string(MAX_USERNAME_LEN)?;
        let count = buf.read_varint()?;
        if count < 0 {
            return Err(CodecError::InvalidLength { field: "property count", length: count });
        }
        let mut properties = Vec::with_capacity((count as usize).min(16));
        for _ in 0..count {
            let name = buf.read_string(64)?;
            let value = buf.read_string(MAX_STRING_LEN)?;
            let signature = if buf.read_bool()? {
                Some(buf.read_string(1024)?)
            } else {
                None
            };
            properties.push(ProfileProperty { name, value, signature });
        }
        Ok(Self { uuid, username, properties })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_uuid(&self.uuid);
        buf.write_string(&self.username);
        buf.write_varint(self.properties.len() as i32);
        for property in &self.properties {
            buf.write_string(&property.name);
            buf.write_string(&property.value);
            match &property.signature {
                Some(signature) => {
                    buf.write_bool(true);
                    buf.write_string(signature);
                }
                None => buf.write_bool(false),
            }
        }
    }
}

/// Enables compression for every following frame on this link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    /// Smallest payload that gets deflated; negative disables compression.
    pub threshold: i32,
}

impl Message for SetCompression {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { threshold: buf.read_varint()? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_varint(self.threshold);
    }
}

empty_message!(
    /// Client confirms the login success and moves to CONFIGURATION.
    LoginAcknowledged
);

/// LOGIN-state kick; the reason is a JSON text component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnect {
    pub reason: String,
}

impl LoginDisconnect {
    /// Wrap plain text as a red JSON text component.
    pub fn from_text(text: &str) -> Self {
        let reason = serde_json::json!({ "text": text, "color": "red" }).to_string();
        Self { reason }
    }

    /// Best-effort plain text of the reason.
    pub fn text(&self) -> String {
        match serde_json::from_str::<serde_json::Value>(&self.reason) {
            Ok(serde_json::Value::String(text)) => text,
            Ok(value) => value
                .get("text")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| self.reason.clone()),
            Err(_) => self.reason.clone(),
        }
    }
}

impl Message for LoginDisconnect {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { reason: buf.read_string(262_144)? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.reason);
    }
}
