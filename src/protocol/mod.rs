//! Protocol layer: wire primitives, messages, registry and state machine.
//!
//! # Data Flow
//! ```text
//! decompressed frame
//!     → codec.rs (read varint id)
//!     → registry.rs (direction, state, id) → PacketKind
//!     → packets/* (typed body decode)
//!     → Packet, or Passthrough for unknown ids in CONFIGURATION/PLAY
//!
//! Packet
//!     → registry.rs (direction, state, kind) → id
//!     → varint(id) ++ body
//! ```
//!
//! # Design Decisions
//! - The state used for a lookup always comes from the `ProtocolStates`
//!   slot of the link doing the decoding or encoding
//! - No knowledge of sockets or byte transforms lives here

pub mod buf;
pub mod codec;
pub mod error;
pub mod mutf8;
pub mod packets;
pub mod registry;
pub mod state;
pub mod varint;

pub use codec::{Inbound, Passthrough};
pub use error::CodecError;
pub use packets::{Packet, PacketKind};
pub use registry::{PacketRegistry, GAME_VERSION, PROTOCOL_VERSION};
pub use state::{Direction, ProtocolState, ProtocolStates, StateError, StateSlot};
