//! CONFIGURATION state messages.
//!
//! `PluginMessage`, `KeepAlive`, `Disconnect` and `ClientInformation` are
//! registered again under PLAY with different ids.

use bytes::{Bytes, BytesMut, BufMut};

use crate::protocol::buf::{ProtoRead, ProtoWrite, MAX_STRING_LEN};
use crate::protocol::error::CodecError;
use crate::protocol::packets::{empty_message, Message, TextComponent};

/// Client settings; remembered so they can be replayed to the next backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInformation {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub displayed_skin_parts: u8,
    pub main_hand: i32,
    pub text_filtering: bool,
    pub allow_server_listings: bool,
    pub particle_status: i32,
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            locale: "en_us".into(),
            view_distance: 10,
            chat_mode: 0,
            chat_colors: true,
            displayed_skin_parts: 0x7f,
            main_hand: 1,
            text_filtering: false,
            allow_server_listings: true,
            particle_status: 0,
        }
    }
}

impl Message for ClientInformation {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            locale: buf.read_string(16)?,
            view_distance: buf.read_i8_checked("view distance")?,
            chat_mode: buf.read_varint()?,
            chat_colors: buf.read_bool()?,
            displayed_skin_parts: buf.read_u8_checked("skin parts")?,
            main_hand: buf.read_varint()?,
            text_filtering: buf.read_bool()?,
            allow_server_listings: buf.read_bool()?,
            particle_status: buf.read_varint()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.locale);
        buf.put_i8(self.view_distance);
        buf.write_varint(self.chat_mode);
        buf.write_bool(self.chat_colors);
        buf.put_u8(self.displayed_skin_parts);
        buf.write_varint(self.main_hand);
        buf.write_bool(self.text_filtering);
        buf.write_bool(self.allow_server_listings);
        buf.write_varint(self.particle_status);
    }
}

/// Custom payload on a namespaced channel; the data runs to the end of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    pub channel: String,
    pub data: Bytes,
}

impl Message for PluginMessage {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            channel: buf.read_string(MAX_STRING_LEN)?,
            data: buf.read_remaining(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.channel);
        buf.put_slice(&self.data);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl Message for KeepAlive {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { id: buf.read_i64_checked("keep-alive id")? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.id);
    }
}

/// Kick in CONFIGURATION or PLAY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: TextComponent,
}

impl Message for Disconnect {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { reason: TextComponent::decode(buf, 0)? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.reason.encode(buf);
    }
}

empty_message!(
    /// Backend is done configuring the client.
    FinishConfiguration
);

empty_message!(
    /// Client acknowledges [`FinishConfiguration`] and enters PLAY.
    FinishConfigurationAck
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packets::round_trip;

    #[test]
    fn client_information_round_trip() {
        let info = ClientInformation::default();
        assert_eq!(round_trip(&info), info);

        let edge = ClientInformation {
            locale: String::new(),
            view_distance: i8::MIN,
            chat_mode: 2,
            chat_colors: false,
            displayed_skin_parts: 0,
            main_hand: 0,
            text_filtering: true,
            allow_server_listings: false,
            particle_status: 2,
        };
        assert_eq!(round_trip(&edge), edge);
    }

    #[test]
    fn plugin_message_keeps_raw_data() {
        let message = PluginMessage {
            channel: "minecraft:brand".into(),
            data: Bytes::from_static(b"\x07vanilla"),
        };
        assert_eq!(round_trip(&message), message);

        let empty = PluginMessage { channel: "a:b".into(), data: Bytes::new() };
        assert_eq!(round_trip(&empty), empty);
    }

    #[test]
    fn small_messages_round_trip() {
        let keep_alive = KeepAlive { id: -42 };
        assert_eq!(round_trip(&keep_alive), keep_alive);
        let kick = Disconnect { reason: TextComponent::plain("bye") };
        assert_eq!(round_trip(&kick), kick);
        assert_eq!(round_trip(&FinishConfiguration), FinishConfiguration);
        assert_eq!(round_trip(&FinishConfigurationAck), FinishConfigurationAck);
    }
}
