//! Key codes, modifier masks and the escape-sequence key table.
//!
//! Invariant after construction: no two table entries share a byte sequence,
//! and entries are ordered longest sequence first so prefix matching commits
//! to the most specific decoding.

use bitflags::bitflags;

use crate::error::Error;
use crate::logging::safe;

bitflags! {
    /// Modifier mask accompanying key and mouse events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifier: u8 {
        const SHIFT = 1 << 0;
        const ALT   = 1 << 1;
        const CTRL  = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Up, Down, Left, Right,
    Home, End, PageUp, PageDown, Insert, Delete,
    Backspace, Tab, Enter, Escape, Space, NumpadCenter,
}

const LETTERS: [Key; 26] = [
    Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I,
    Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R,
    Key::S, Key::T, Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
];

const DIGITS: [Key; 10] = [
    Key::Num0, Key::Num1, Key::Num2, Key::Num3, Key::Num4,
    Key::Num5, Key::Num6, Key::Num7, Key::Num8, Key::Num9,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1, Key::F2, Key::F3, Key::F4, Key::F5, Key::F6,
    Key::F7, Key::F8, Key::F9, Key::F10, Key::F11, Key::F12,
];

impl Key {
    /// Key for an ASCII letter, case-insensitive.
    pub fn from_letter(ch: char) -> Option<Key> {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_lowercase() {
            Some(LETTERS[(lower as u8 - b'a') as usize])
        } else {
            None
        }
    }

    pub fn from_digit(ch: char) -> Option<Key> {
        if ch.is_ascii_digit() {
            Some(DIGITS[(ch as u8 - b'0') as usize])
        } else {
            None
        }
    }
}

/// One escape-sequence-to-key mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySequence {
    pub sequence: Vec<u8>,
    pub mods: Modifier,
    pub key: Key,
}

fn describe(key: Key, mods: Modifier) -> String {
    let mut out = String::new();
    for (flag, name) in [
        (Modifier::SHIFT, "Shift+"),
        (Modifier::ALT, "Alt+"),
        (Modifier::CTRL, "Ctrl+"),
    ] {
        if mods.contains(flag) {
            out.push_str(name);
        }
    }
    out.push_str(&format!("{key:?}"));
    out
}

/// Modifier mask for an xterm `mod` parameter (`1 + shift + 2*alt + 4*ctrl`).
fn mods_for_param(param: u8) -> Modifier {
    let bits = param - 1;
    let mut mods = Modifier::empty();
    if bits & 1 != 0 {
        mods |= Modifier::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Modifier::ALT;
    }
    if bits & 4 != 0 {
        mods |= Modifier::CTRL;
    }
    mods
}

/// Ctrl-range bytes 0x01..=0x1A carry fixed terminal meanings for a few
/// values; the rest are Ctrl+letter.
fn control_byte_key(code: u8) -> (Modifier, Key) {
    match code {
        0x08 => (Modifier::CTRL, Key::Backspace),
        0x09 => (Modifier::empty(), Key::Tab),
        0x0a | 0x0d => (Modifier::empty(), Key::Enter),
        _ => (Modifier::CTRL, LETTERS[(code - 1) as usize]),
    }
}

/// Build the static key table: every recognized escape sequence paired with
/// its key and modifier mask, validated for duplicates and sorted longest
/// sequence first.
pub fn build_key_table() -> Result<Vec<KeySequence>, Error> {
    let mut table = Vec::with_capacity(256);
    let mut push = |sequence: Vec<u8>, mods: Modifier, key: Key| {
        table.push(KeySequence {
            sequence,
            mods,
            key,
        });
    };

    // Bare control bytes.
    push(vec![0x00], Modifier::CTRL, Key::Space);
    for code in 0x01..=0x1au8 {
        let (mods, key) = control_byte_key(code);
        push(vec![code], mods, key);
    }
    push(vec![0x7f], Modifier::empty(), Key::Backspace);

    // ESC-prefixed control bytes (Alt chord on top of the bare meaning).
    push(vec![0x1b, 0x00], Modifier::ALT | Modifier::CTRL, Key::Space);
    for code in 0x01..=0x1au8 {
        let (mods, key) = match code {
            0x08 => (Modifier::ALT | Modifier::CTRL, Key::Backspace),
            0x09 => (Modifier::ALT, Key::Tab),
            _ => (Modifier::ALT | Modifier::CTRL, LETTERS[(code - 1) as usize]),
        };
        push(vec![0x1b, code], mods, key);
    }

    // Alt+letter and Alt+Shift+letter.
    for (idx, key) in LETTERS.iter().enumerate() {
        push(vec![0x1b, b'a' + idx as u8], Modifier::ALT, *key);
        push(
            vec![0x1b, b'A' + idx as u8],
            Modifier::ALT | Modifier::SHIFT,
            *key,
        );
    }

    push(vec![0x1b], Modifier::empty(), Key::Escape);
    push(vec![0x1b, 0x1b], Modifier::ALT, Key::Escape);

    // SS3 function keys F1-F4.
    for (idx, final_byte) in [b'P', b'Q', b'R', b'S'].into_iter().enumerate() {
        push(vec![0x1b, b'O', final_byte], Modifier::empty(), FUNCTION_KEYS[idx]);
    }

    // Plain CSI letter finals.
    for (final_byte, key) in [
        (b'A', Key::Up),
        (b'B', Key::Down),
        (b'C', Key::Right),
        (b'D', Key::Left),
        (b'H', Key::Home),
        (b'F', Key::End),
        (b'E', Key::NumpadCenter),
    ] {
        push(vec![0x1b, b'[', final_byte], Modifier::empty(), key);
    }
    push(vec![0x1b, b'[', b'Z'], Modifier::SHIFT, Key::Tab);

    // Tilde-final keys: navigation block and F5-F12, plain and modified.
    let tilde_keys: [(u8, Key); 12] = [
        (2, Key::Insert),
        (3, Key::Delete),
        (5, Key::PageUp),
        (6, Key::PageDown),
        (15, Key::F5),
        (17, Key::F6),
        (18, Key::F7),
        (19, Key::F8),
        (20, Key::F9),
        (21, Key::F10),
        (23, Key::F11),
        (24, Key::F12),
    ];
    for (num, key) in tilde_keys {
        push(
            format!("\x1b[{num}~").into_bytes(),
            Modifier::empty(),
            key,
        );
        for param in 2..=8u8 {
            push(
                format!("\x1b[{num};{param}~").into_bytes(),
                mods_for_param(param),
                key,
            );
        }
    }

    // `CSI 1 ; mod <final>`: modified arrows, Home/End, numpad center, F1-F4.
    for param in 2..=8u8 {
        let mods = mods_for_param(param);
        for (final_byte, key) in [
            (b'A', Key::Up),
            (b'B', Key::Down),
            (b'C', Key::Right),
            (b'D', Key::Left),
            (b'H', Key::Home),
            (b'F', Key::End),
            (b'E', Key::NumpadCenter),
            (b'P', Key::F1),
            (b'Q', Key::F2),
            (b'R', Key::F3),
            (b'S', Key::F4),
        ] {
            let mut sequence = format!("\x1b[1;{param}").into_bytes();
            sequence.push(final_byte);
            push(sequence, mods, key);
        }
    }

    validate_unique(&table)?;

    // Longest sequence first; stable so same-length entries keep build order.
    let mut table = table;
    table.sort_by(|a, b| b.sequence.len().cmp(&a.sequence.len()));

    Ok(table)
}

/// Fail construction when two entries share a byte sequence.
fn validate_unique(table: &[KeySequence]) -> Result<(), Error> {
    let mut seen: std::collections::HashMap<&[u8], &KeySequence> =
        std::collections::HashMap::with_capacity(table.len());
    for entry in table {
        if let Some(existing) = seen.insert(entry.sequence.as_slice(), entry) {
            return Err(Error::KeyTableConflict {
                sequence: safe(&entry.sequence),
                first: describe(existing.key, existing.mods),
                second: describe(entry.key, entry.mods),
            });
        }
    }
    Ok(())
}
