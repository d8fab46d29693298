//! Typed messages the proxy understands.
//!
//! # Design Decisions
//! - `Packet` is a closed tagged union; `PacketKind` is its fieldless
//!   discriminant and the key the registry stores
//! - Decoding is dispatched through a plain `fn` pointer per kind, so the
//!   registry hands out constructors without any reflection
//! - One message type may sit in several (direction, state) slots; the
//!   plugin message, keep-alive and disconnect types do

use bytes::{Bytes, BytesMut};

use crate::protocol::error::CodecError;

/// Declares a message with no body.
macro_rules! empty_message {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl $crate::protocol::packets::Message for $name {
            fn decode(_buf: &mut ::bytes::Bytes) -> Result<Self, $crate::protocol::error::CodecError> {
                Ok($name)
            }

            fn encode(&self, _buf: &mut ::bytes::BytesMut) {}
        }
    };
}

pub(crate) use empty_message;

pub mod component;
pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub use component::TextComponent;
pub use configuration::{
    ClientInformation, Disconnect, FinishConfiguration, FinishConfigurationAck, KeepAlive,
    PluginMessage,
};
pub use handshake::Handshake;
pub use login::{
    EncryptionRequest, EncryptionResponse, Hello, LoginAcknowledged, LoginDisconnect,
    LoginSuccess, ProfileProperty, SetCompression,
};
pub use play::{ChatCommand, ConfigurationAck, StartConfiguration, SystemChat};
pub use status::{PingRequest, PongResponse, StatusRequest, StatusResponse};

/// Body codec implemented by every message type.
pub trait Message: Sized {
    /// Parse the body that follows the packet id.
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError>;

    /// Append the body (without the id).
    fn encode(&self, buf: &mut BytesMut);
}

/// Constructor the registry hands out for an id.
pub type DecodeFn = fn(&mut Bytes) -> Result<Packet, CodecError>;

fn decode_as<M: Message + Into<Packet>>(buf: &mut Bytes) -> Result<Packet, CodecError> {
    M::decode(buf).map(Into::into)
}

macro_rules! packets {
    ($($name:ident),* $(,)?) => {
        /// Any message the proxy can decode or encode.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($name($name),)*
        }

        /// Discriminant of [`Packet`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind {
            $($name,)*
        }

        impl Packet {
            pub fn kind(&self) -> PacketKind {
                match self {
                    $(Packet::$name(_) => PacketKind::$name,)*
                }
            }

            pub fn encode_body(&self, buf: &mut BytesMut) {
                match self {
                    $(Packet::$name(packet) => packet.encode(buf),)*
                }
            }
        }

        impl PacketKind {
            pub fn decoder(self) -> DecodeFn {
                match self {
                    $(PacketKind::$name => decode_as::<$name> as DecodeFn,)*
                }
            }
        }

        $(
            impl From<$name> for Packet {
                fn from(packet: $name) -> Self {
                    Packet::$name(packet)
                }
            }
        )*
    };
}

packets! {
    Handshake,
    StatusRequest,
    StatusResponse,
    PingRequest,
    PongResponse,
    Hello,
    EncryptionRequest,
    EncryptionResponse,
    LoginSuccess,
    SetCompression,
    LoginAcknowledged,
    LoginDisconnect,
    ClientInformation,
    PluginMessage,
    KeepAlive,
    FinishConfiguration,
    FinishConfigurationAck,
    Disconnect,
    StartConfiguration,
    ConfigurationAck,
    ChatCommand,
    SystemChat,
}

#[cfg(test)]
pub(crate) fn round_trip<M: Message + PartialEq + std::fmt::Debug>(message: &M) -> M {
    let mut buf = BytesMut::new();
    message.encode(&mut buf);
    let mut bytes = buf.freeze();
    let decoded = M::decode(&mut bytes).expect("decode");
    assert!(bytes.is_empty(), "trailing bytes after decode");
    decoded
}
