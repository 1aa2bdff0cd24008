//! Single-codepoint UTF-8 decoding and Unicode space classification.

/// Outcome of decoding one codepoint from the head of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Step {
    /// A complete codepoint and the number of bytes it occupied.
    Char { codepoint: char, len: usize },
    /// A valid lead byte whose continuation bytes have not arrived yet.
    Incomplete,
    /// Not decodable as UTF-8 at this position.
    Invalid,
}

/// Decode exactly one codepoint starting at offset 0.
pub fn decode_one(bytes: &[u8]) -> Utf8Step {
    let Some(&lead) = bytes.first() else {
        return Utf8Step::Incomplete;
    };

    let (len, mut value) = match lead {
        0x00..=0x7f => (1, u32::from(lead)),
        0xc0..=0xdf => (2, u32::from(lead & 0x1f)),
        0xe0..=0xef => (3, u32::from(lead & 0x0f)),
        0xf0..=0xf7 => (4, u32::from(lead & 0x07)),
        _ => return Utf8Step::Invalid,
    };

    if bytes.len() < len {
        // Only a truncated tail is recoverable; wait for the next read.
        for &byte in &bytes[1..] {
            if byte & 0xc0 != 0x80 {
                return Utf8Step::Invalid;
            }
        }
        return Utf8Step::Incomplete;
    }

    for &byte in &bytes[1..len] {
        if byte & 0xc0 != 0x80 {
            return Utf8Step::Invalid;
        }
        value = (value << 6) | u32::from(byte & 0x3f);
    }

    // Reject overlong encodings; char::from_u32 rejects surrogates and
    // out-of-range values.
    let min = match len {
        2 => 0x80,
        3 => 0x800,
        4 => 0x1_0000,
        _ => 0,
    };
    if len > 1 && value < min {
        return Utf8Step::Invalid;
    }

    match char::from_u32(value) {
        Some(codepoint) => Utf8Step::Char { codepoint, len },
        None => Utf8Step::Invalid,
    }
}

/// Breaking space codepoints: positions where printed text may wrap.
const BREAKING_SPACES: [u32; 17] = [
    0x0020, 0x1680, 0x180e, 0x2000, 0x2001, 0x2002, 0x2003, 0x2004, 0x2005,
    0x2006, 0x2007, 0x2008, 0x2009, 0x200a, 0x200b, 0x205f, 0x3000,
];

/// Non-breaking space codepoints.
const NON_BREAKING_SPACES: [u32; 3] = [0x00a0, 0x202f, 0xfeff];

pub fn is_breaking_space(codepoint: char) -> bool {
    BREAKING_SPACES.binary_search(&(codepoint as u32)).is_ok()
}

pub fn is_space(codepoint: char) -> bool {
    is_breaking_space(codepoint)
        || NON_BREAKING_SPACES
            .binary_search(&(codepoint as u32))
            .is_ok()
}
