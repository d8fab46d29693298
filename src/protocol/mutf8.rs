//! Java's modified UTF-8, as used by NBT string tags.
//!
//! Differs from UTF-8 in two ways: NUL is written as `C0 80`, and
//! characters outside the BMP are written as a UTF-16 surrogate pair with
//! each half encoded on its own (six bytes instead of four).

/// Longest string an NBT string tag can carry (`u16` length prefix).
pub const MAX_ENCODED_LEN: usize = u16::MAX as usize;

fn unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        _ => 3,
    }
}

fn push_unit(out: &mut Vec<u8>, unit: u16) {
    match unit_len(unit) {
        1 => out.push(unit as u8),
        2 => {
            out.push(0xC0 | (unit >> 6) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            out.push(0xE0 | (unit >> 12) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
}

fn char_len(c: char) -> usize {
    let mut units = [0u16; 2];
    c.encode_utf16(&mut units).iter().map(|&unit| unit_len(unit)).sum()
}

/// Encoded size of `text` in bytes.
pub fn encoded_len(text: &str) -> usize {
    text.chars().map(char_len).sum()
}

/// Longest prefix of `text`, cut at a character boundary, whose encoding
/// fits in `max` bytes.
pub fn fitting_prefix(text: &str, max: usize) -> &str {
    let mut used = 0;
    for (index, c) in text.char_indices() {
        used += char_len(c);
        if used > max {
            return &text[..index];
        }
    }
    text
}

pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut units = [0u16; 2];
    for c in text.chars() {
        for &unit in c.encode_utf16(&mut units).iter() {
            push_unit(&mut out, unit);
        }
    }
    out
}

/// Decode modified UTF-8. `None` if the bytes are malformed or hold an
/// unpaired surrogate.
pub fn decode(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let continuation = |offset: usize| -> Option<u16> {
            let b = *bytes.get(i + offset)?;
            (b & 0xC0 == 0x80).then_some(u16::from(b & 0x3F))
        };
        let (unit, width) = if b0 & 0x80 == 0 {
            (u16::from(b0), 1)
        } else if b0 & 0xE0 == 0xC0 {
            ((u16::from(b0 & 0x1F) << 6) | continuation(1)?, 2)
        } else if b0 & 0xF0 == 0xE0 {
            ((u16::from(b0 & 0x0F) << 12) | (continuation(1)? << 6) | continuation(2)?, 3)
        } else {
            return None;
        };
        units.push(unit);
        i += width;
    }
    String::from_utf16(&units).ok()
}
