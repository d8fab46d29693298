//! Text components as they appear in CONFIGURATION and PLAY.
//!
//! Those states carry components as network NBT (no root name). The proxy
//! only ever writes plain text, which is a bare string tag; anything a
//! backend sends that is not a plain string tag is kept as opaque bytes so
//! it can be relayed untouched. String tags use Java's modified UTF-8
//! (see [`mutf8`]).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::buf::ProtoRead;
use crate::protocol::error::CodecError;
use crate::protocol::mutf8;

const TAG_STRING: u8 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextComponent {
    /// A root string tag.
    Plain(String),
    /// Any other NBT shape, carried verbatim.
    Raw(Bytes),
}

impl TextComponent {
    /// Plain text component. Text whose encoding would not fit a string tag
    /// is cut at the last character that fits; use [`TextComponent::try_plain`]
    /// to refuse it instead.
    pub fn plain(text: impl Into<String>) -> Self {
        let mut text = text.into();
        let keep = mutf8::fitting_prefix(&text, mutf8::MAX_ENCODED_LEN).len();
        text.truncate(keep);
        TextComponent::Plain(text)
    }

    /// Plain text component, refusing text too long for a string tag.
    pub fn try_plain(text: impl Into<String>) -> Result<Self, CodecError> {
        let text = text.into();
        let length = mutf8::encoded_len(&text);
        if length > mutf8::MAX_ENCODED_LEN {
            return Err(CodecError::StringTooLong {
                length,
                max: mutf8::MAX_ENCODED_LEN,
            });
        }
        Ok(TextComponent::Plain(text))
    }

    /// Decode a component that is followed by `trailing` bytes of other fields.
    pub fn decode(buf: &mut Bytes, trailing: usize) -> Result<Self, CodecError> {
        if buf.first() == Some(&TAG_STRING) {
            let tag = buf.clone();
            buf.advance(1);
            let length = buf.read_u16_checked("component length")? as usize;
            if buf.remaining() < length {
                return Err(CodecError::UnexpectedEof("component"));
            }
            let raw = buf.copy_to_bytes(length);
            // Unpaired surrogates have no `String` form; relay them as-is.
            return Ok(match mutf8::decode(&raw) {
                Some(text) => TextComponent::Plain(text),
                None => TextComponent::Raw(tag.slice(..3 + length)),
            });
        }
        let length = buf
            .remaining()
            .checked_sub(trailing)
            .ok_or(CodecError::UnexpectedEof("component"))?;
        if length == 0 {
            return Err(CodecError::UnexpectedEof("component"));
        }
        Ok(TextComponent::Raw(buf.copy_to_bytes(length)))
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            TextComponent::Plain(text) => {
                let encoded = mutf8::encode(mutf8::fitting_prefix(text, mutf8::MAX_ENCODED_LEN));
                buf.put_u8(TAG_STRING);
                buf.put_u16(encoded.len() as u16);
                buf.put_slice(&encoded);
            }
            TextComponent::Raw(raw) => buf.put_slice(raw),
        }
    }

    /// Human-readable form for logs and kick messages.
    pub fn to_plain(&self) -> String {
        match self {
            TextComponent::Plain(text) => text.clone(),
            TextComponent::Raw(raw) => format!("<{} byte component>", raw.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_component_is_string_tag() {
        let mut buf = BytesMut::new();
        TextComponent::plain("hi").encode(&mut buf);
        assert_eq!(&buf[..], &[0x08, 0x00, 0x02, b'h', b'i']);

        let mut bytes = buf.freeze();
        assert_eq!(TextComponent::decode(&mut bytes, 0).unwrap(), TextComponent::plain("hi"));
    }

    #[test]
    fn emoji_and_nul_use_modified_utf8() {
        let mut buf = BytesMut::new();
        TextComponent::plain("😀").encode(&mut buf);
        assert_eq!(&buf[..], &[0x08, 0x00, 0x06, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]);

        let mut buf = BytesMut::new();
        TextComponent::plain("a\0").encode(&mut buf);
        assert_eq!(&buf[..], &[0x08, 0x00, 0x03, b'a', 0xC0, 0x80]);

        for text in ["hi 😀 there", "nul\0inside", "ünïcödé"] {
            let mut buf = BytesMut::new();
            TextComponent::plain(text).encode(&mut buf);
            let mut bytes = buf.freeze();
            assert_eq!(TextComponent::decode(&mut bytes, 0).unwrap(), TextComponent::plain(text));
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn backend_chat_with_emoji_decodes() {
        // SystemChat body: string tag "😀", overlay = false
        let wire = [0x08, 0x00, 0x06, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80, 0x00];
        let mut bytes = Bytes::copy_from_slice(&wire);
        assert_eq!(TextComponent::decode(&mut bytes, 1).unwrap(), TextComponent::plain("😀"));
        assert_eq!(&bytes[..], &[0x00]);
    }

    #[test]
    fn unpaired_surrogate_is_relayed_verbatim() {
        let wire = [0x08, 0x00, 0x03, 0xED, 0xA0, 0xBD, 0x01];
        let mut bytes = Bytes::copy_from_slice(&wire);
        let component = TextComponent::decode(&mut bytes, 1).unwrap();
        assert_eq!(component, TextComponent::Raw(Bytes::copy_from_slice(&wire[..6])));

        let mut out = BytesMut::new();
        component.encode(&mut out);
        assert_eq!(&out[..], &wire[..6]);
    }

    #[test]
    fn over_long_text_is_refused_or_cut() {
        let long = "😀".repeat(mutf8::MAX_ENCODED_LEN / 6 + 1);
        assert!(matches!(
            TextComponent::try_plain(long.clone()),
            Err(CodecError::StringTooLong { max, .. }) if max == mutf8::MAX_ENCODED_LEN
        ));

        let cut = TextComponent::plain(long);
        let mut buf = BytesMut::new();
        cut.encode(&mut buf);
        let declared = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        assert_eq!(declared, buf.len() - 3);
        assert_eq!(declared, mutf8::MAX_ENCODED_LEN / 6 * 6);
        assert_eq!(TextComponent::decode(&mut buf.freeze(), 0).unwrap(), cut);
    }

    #[test]
    fn compound_component_is_kept_raw() {
        // TAG_Compound { text: "x" } followed by one trailing byte
        let wire = [0x0a, 0x08, 0x00, 0x04, b't', b'e', b'x', b't', 0x00, 0x01, b'x', 0x00, 0x01];
        let mut bytes = Bytes::copy_from_slice(&wire);
        let component = TextComponent::decode(&mut bytes, 1).unwrap();
        assert_eq!(component, TextComponent::Raw(Bytes::copy_from_slice(&wire[..12])));
        assert_eq!(bytes.remaining(), 1);
    }
}
