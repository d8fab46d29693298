//! PLAY state messages the proxy acts on.

use bytes::{Bytes, BytesMut};

use crate::protocol::buf::{ProtoRead, ProtoWrite};
use crate::protocol::error::CodecError;
use crate::protocol::packets::{empty_message, Message, TextComponent};

empty_message!(
    /// Asks the client to go back to CONFIGURATION.
    StartConfiguration
);

empty_message!(
    /// Client's answer to [`StartConfiguration`].
    ConfigurationAck
);

/// Longest command the client may send, in characters.
pub const MAX_COMMAND_LEN: usize = 32767;

/// Unsigned `/command` typed by the player, without the slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub command: String,
}

impl ChatCommand {
    /// First word of the command and the rest of the line.
    pub fn split(&self) -> (&str, &str) {
        match self.command.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (self.command.as_str(), ""),
        }
    }
}

impl Message for ChatCommand {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self { command: buf.read_string(MAX_COMMAND_LEN)? })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.write_string(&self.command);
    }
}

/// Server-originated chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemChat {
    pub content: TextComponent,
    /// Shown above the hotbar instead of in chat.
    pub overlay: bool,
}

impl SystemChat {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content: TextComponent::plain(text), overlay: false }
    }
}

impl Message for SystemChat {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(Self {
            content: TextComponent::decode(buf, 1)?,
            overlay: buf.read_bool()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.content.encode(buf);
        buf.write_bool(self.overlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packets::round_trip;

    #[test]
    fn play_messages_round_trip() {
        assert_eq!(round_trip(&StartConfiguration), StartConfiguration);
        assert_eq!(round_trip(&ConfigurationAck), ConfigurationAck);

        let chat = SystemChat::text("Connecting you to survival");
        assert_eq!(round_trip(&chat), chat);

        let overlay = SystemChat { content: TextComponent::plain(""), overlay: true };
        assert_eq!(round_trip(&overlay), overlay);

        let command = ChatCommand { command: "server survival".into() };
        assert_eq!(round_trip(&command), command);
    }

    #[test]
    fn command_splits_name_and_arguments() {
        let command = ChatCommand { command: "server  survival ".into() };
        assert_eq!(command.split(), ("server", "survival"));
        let bare = ChatCommand { command: "server".into() };
        assert_eq!(bare.split(), ("server", ""));
    }

    #[test]
    fn over_long_command_is_rejected() {
        let mut buf = BytesMut::new();
        buf.write_string(&"a".repeat(MAX_COMMAND_LEN + 1));
        assert!(matches!(
            ChatCommand::decode(&mut buf.freeze()),
            Err(CodecError::StringTooLong { .. })
        ));
    }
}
