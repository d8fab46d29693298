//! Id/payload codec: the last stage between a decompressed frame and a message.

use bytes::{Bytes, BytesMut};

use crate::protocol::buf::ProtoRead;
use crate::protocol::error::CodecError;
use crate::protocol::packets::Packet;
use crate::protocol::registry::PacketRegistry;
use crate::protocol::state::{Direction, ProtocolState};
use crate::protocol::varint::write_varint;

/// A frame whose id the registry does not model, kept for verbatim relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passthrough {
    pub id: i32,
    pub body: Bytes,
}

impl Passthrough {
    /// Put the id back in front of the body.
    pub fn to_frame(&self) -> BytesMut {
        let mut frame = BytesMut::with_capacity(self.body.len() + 5);
        write_varint(&mut frame, self.id);
        frame.extend_from_slice(&self.body);
        frame
    }
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Packet(Packet),
    Passthrough(Passthrough),
}

/// Decode one frame (`varint(id) ++ body`) in the given direction and state.
///
/// Unknown ids become [`Inbound::Passthrough`] in CONFIGURATION and PLAY and
/// an error everywhere else.
pub fn decode_frame(
    registry: &PacketRegistry,
    direction: Direction,
    state: ProtocolState,
    mut frame: Bytes,
) -> Result<Inbound, CodecError> {
    let id = frame.read_varint()?;
    if registry.lookup(direction, state, id).is_none() {
        if state.allows_passthrough() {
            return Ok(Inbound::Passthrough(Passthrough { id, body: frame }));
        }
        return Err(CodecError::UnknownPacket { direction, state, id });
    }
    registry.decode(direction, state, id, &mut frame).map(Inbound::Packet)
}

/// Encode `packet` to `varint(id) ++ body`.
pub fn encode_packet(
    registry: &PacketRegistry,
    direction: Direction,
    state: ProtocolState,
    packet: &Packet,
) -> Result<BytesMut, CodecError> {
    registry.encode(direction, state, packet).map(|(_, bytes)| bytes)
}
