//! Bidirectional packet table.
//!
//! # Responsibilities
//! - Map (direction, state, id) to a message kind for decoding
//! - Map (direction, state, kind) back to an id for encoding
//! - Provide the table for the one protocol version the proxy speaks
//!
//! # Design Decisions
//! - Built mutably at startup, then shared behind an `Arc` and never written
//!   again, so lookups need no locking
//! - Registration is last-writer-wins; overwrites are logged, not rejected

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::error::CodecError;
use crate::protocol::packets::{Packet, PacketKind};
use crate::protocol::state::{Direction, ProtocolState};
use crate::protocol::varint::write_varint;

/// Protocol version number of the supported game version.
pub const PROTOCOL_VERSION: i32 = 772;

/// Game version the protocol number belongs to.
pub const GAME_VERSION: &str = "1.21.8";

/// Registry of message kinds per direction and state.
#[derive(Debug, Default)]
pub struct PacketRegistry {
    kinds: HashMap<(Direction, ProtocolState, i32), PacketKind>,
    ids: HashMap<(Direction, ProtocolState, PacketKind), i32>,
}

impl PacketRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with every message the proxy models.
    pub fn standard() -> Self {
        use Direction::{Clientbound as C, Serverbound as S};
        use PacketKind as K;
        use ProtocolState::*;

        let mut registry = Self::new();
        let table: &[(Direction, ProtocolState, i32, PacketKind)] = &[
            (S, Handshake, 0x00, K::Handshake),
            (S, Status, 0x00, K::StatusRequest),
            (S, Status, 0x01, K::PingRequest),
            (C, Status, 0x00, K::StatusResponse),
            (C, Status, 0x01, K::PongResponse),
            (S, Login, 0x00, K::Hello),
            (S, Login, 0x01, K::EncryptionResponse),
            (S, Login, 0x03, K::LoginAcknowledged),
            (C, Login, 0x00, K::LoginDisconnect),
            (C, Login, 0x01, K::EncryptionRequest),
            (C, Login, 0x02, K::LoginSuccess),
            (C, Login, 0x03, K::SetCompression),
            (S, Configuration, 0x00, K::ClientInformation),
            (S, Configuration, 0x02, K::PluginMessage),
            (S, Configuration, 0x03, K::FinishConfigurationAck),
            (S, Configuration, 0x04, K::KeepAlive),
            (C, Configuration, 0x01, K::PluginMessage),
            (C, Configuration, 0x02, K::Disconnect),
            (C, Configuration, 0x03, K::FinishConfiguration),
            (C, Configuration, 0x04, K::KeepAlive),
            (S, Play, 0x06, K::ChatCommand),
            (S, Play, 0x0D, K::ClientInformation),
            (S, Play, 0x0F, K::ConfigurationAck),
            (S, Play, 0x15, K::PluginMessage),
            (S, Play, 0x1B, K::KeepAlive),
            (C, Play, 0x18, K::PluginMessage),
            (C, Play, 0x1C, K::Disconnect),
            (C, Play, 0x26, K::KeepAlive),
            (C, Play, 0x6F, K::StartConfiguration),
            (C, Play, 0x72, K::SystemChat),
        ];
        for &(direction, state, id, kind) in table {
            registry.register(direction, state, id, kind);
        }
        registry
    }

    /// Register `kind` under `id`. A previous entry for the same slot is replaced.
    pub fn register(&mut self, direction: Direction, state: ProtocolState, id: i32, kind: PacketKind) {
        if let Some(previous) = self.kinds.insert((direction, state, id), kind) {
            if previous != kind {
                tracing::warn!(
                    %direction,
                    %state,
                    id,
                    ?previous,
                    replacement = ?kind,
                    "Packet id registered twice; last registration wins"
                );
                if self.ids.get(&(direction, state, previous)) == Some(&id) {
                    self.ids.remove(&(direction, state, previous));
                }
            }
        }
        if let Some(old_id) = self.ids.insert((direction, state, kind), id) {
            if old_id != id {
                tracing::warn!(
                    %direction,
                    %state,
                    ?kind,
                    old_id,
                    new_id = id,
                    "Packet kind re-registered under a new id"
                );
                if self.kinds.get(&(direction, state, old_id)) == Some(&kind) {
                    self.kinds.remove(&(direction, state, old_id));
                }
            }
        }
    }

    pub fn lookup(&self, direction: Direction, state: ProtocolState, id: i32) -> Option<PacketKind> {
        self.kinds.get(&(direction, state, id)).copied()
    }

    pub fn id_of(&self, direction: Direction, state: ProtocolState, kind: PacketKind) -> Option<i32> {
        self.ids.get(&(direction, state, kind)).copied()
    }

    /// Decode a body whose id has already been read.
    pub fn decode(
        &self,
        direction: Direction,
        state: ProtocolState,
        id: i32,
        body: &mut Bytes,
    ) -> Result<Packet, CodecError> {
        let kind = self
            .lookup(direction, state, id)
            .ok_or(CodecError::UnknownPacket { direction, state, id })?;
        let packet = (kind.decoder())(body)?;
        if body.has_remaining() {
            tracing::debug!(
                ?kind,
                %state,
                trailing = body.remaining(),
                "Ignoring trailing bytes after packet body"
            );
        }
        Ok(packet)
    }

    /// Encode `packet` as `varint(id) ++ body`.
    pub fn encode(
        &self,
        direction: Direction,
        state: ProtocolState,
        packet: &Packet,
    ) -> Result<(i32, BytesMut), CodecError> {
        let kind = packet.kind();
        let id = self
            .id_of(direction, state, kind)
            .ok_or(CodecError::Unregistered { kind, direction, state })?;
        let mut buf = BytesMut::with_capacity(64);
        write_varint(&mut buf, id);
        packet.encode_body(&mut buf);
        Ok((id, buf))
    }

    /// Number of registered (direction, state, id) slots.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::buf::ProtoRead;
    use crate::protocol::packets::{KeepAlive, PluginMessage, StartConfiguration};

    #[test]
    fn standard_table_is_consistent() {
        let registry = PacketRegistry::standard();
        assert_eq!(registry.len(), 30);

        for ((direction, state, id), kind) in &registry.kinds {
            assert_eq!(registry.id_of(*direction, *state, *kind), Some(*id));
        }
    }

    #[test]
    fn chat_command_is_typed_in_play() {
        let registry = PacketRegistry::standard();
        assert_eq!(
            registry.lookup(Direction::Serverbound, ProtocolState::Play, 0x06),
            Some(PacketKind::ChatCommand)
        );
    }

    #[test]
    fn one_kind_in_several_states() {
        let registry = PacketRegistry::standard();
        let kind = PacketKind::PluginMessage;
        assert_eq!(registry.id_of(Direction::Clientbound, ProtocolState::Configuration, kind), Some(0x01));
        assert_eq!(registry.id_of(Direction::Clientbound, ProtocolState::Play, kind), Some(0x18));
        assert_eq!(registry.id_of(Direction::Serverbound, ProtocolState::Configuration, kind), Some(0x02));
        assert_eq!(registry.id_of(Direction::Serverbound, ProtocolState::Play, kind), Some(0x15));
    }

    #[test]
    fn encode_then_decode_yields_same_id_and_type() {
        let registry = PacketRegistry::standard();
        let packet: Packet = KeepAlive { id: 99 }.into();
        let (id, bytes) = registry
            .encode(Direction::Clientbound, ProtocolState::Play, &packet)
            .unwrap();
        assert_eq!(id, 0x26);

        let mut bytes = bytes.freeze();
        let read_id = bytes.read_varint().unwrap();
        assert_eq!(read_id, id);
        let decoded = registry
            .decode(Direction::Clientbound, ProtocolState::Play, read_id, &mut bytes)
            .unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn encode_of_unregistered_kind_fails() {
        let registry = PacketRegistry::standard();
        let packet: Packet = StartConfiguration.into();
        let err = registry
            .encode(Direction::Clientbound, ProtocolState::Configuration, &packet)
            .unwrap_err();
        assert!(matches!(err, CodecError::Unregistered { kind: PacketKind::StartConfiguration, .. }));
    }

    #[test]
    fn decode_of_unknown_id_is_a_miss() {
        let registry = PacketRegistry::standard();
        let err = registry
            .decode(Direction::Serverbound, ProtocolState::Login, 0x7f, &mut Bytes::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::UnknownPacket { id: 0x7f, .. }));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = PacketRegistry::new();
        registry.register(Direction::Clientbound, ProtocolState::Play, 0x10, PacketKind::KeepAlive);
        registry.register(Direction::Clientbound, ProtocolState::Play, 0x10, PacketKind::PluginMessage);

        assert_eq!(
            registry.lookup(Direction::Clientbound, ProtocolState::Play, 0x10),
            Some(PacketKind::PluginMessage)
        );
        assert_eq!(registry.id_of(Direction::Clientbound, ProtocolState::Play, PacketKind::KeepAlive), None);

        let packet: Packet = PluginMessage { channel: "a:b".into(), data: Bytes::new() }.into();
        let (id, _) = registry.encode(Direction::Clientbound, ProtocolState::Play, &packet).unwrap();
        assert_eq!(id, 0x10);
    }
}
