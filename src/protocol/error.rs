//! Codec error definitions.

use thiserror::Error;

use crate::protocol::packets::PacketKind;
use crate::protocol::state::{Direction, ProtocolState};

/// Errors raised while turning bytes into messages or messages into bytes.
///
/// Every variant is fatal to the physical link it was raised on.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A varint ran past five bytes (or a varlong past ten).
    #[error("variable-length integer is longer than {0} bytes")]
    VarIntTooLong(usize),

    /// The buffer ended in the middle of a field.
    #[error("unexpected end of packet while reading {0}")]
    UnexpectedEof(&'static str),

    /// A frame announced a length outside the accepted range.
    #[error("frame length {0} is out of range")]
    FrameTooLarge(i64),

    /// A length-prefixed field announced a negative or oversized length.
    #[error("invalid length {length} for {field}")]
    InvalidLength { field: &'static str, length: i32 },

    /// A string exceeded its protocol maximum.
    #[error("string of {length} characters exceeds maximum of {max}")]
    StringTooLong { length: usize, max: usize },

    /// A string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A field carried a value the protocol does not define.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: i64 },

    /// Inbound id has no registered message in a state that forbids passthrough.
    #[error("unknown {direction} packet id {id:#04x} in state {state}")]
    UnknownPacket {
        direction: Direction,
        state: ProtocolState,
        id: i32,
    },

    /// Outbound message type has no id in the resolved state.
    #[error("{kind:?} is not registered for {direction} in state {state}")]
    Unregistered {
        kind: PacketKind,
        direction: Direction,
        state: ProtocolState,
    },
}
