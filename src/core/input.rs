//! Byte-level input decoding: terminal escape sequences to typed events.
//!
//! Invariant: no byte is consumed without being delivered as part of exactly
//! one decode commit or explicitly discarded (and logged) on parse failure.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::core::event::{
    Event, FocusEvent, InputEvent, MouseButtonEvent, MouseMoveEvent, MouseWheelEvent,
};
use crate::core::key::{build_key_table, Key, KeySequence, Modifier};
use crate::core::text::utf8::{decode_one, Utf8Step};
use crate::error::Error;
use crate::logging::{hex, safe};

const MOUSE_PREFIX: &[u8] = b"\x1b[<";
/// Shortest decodable SGR mouse report: prefix plus `0;1;1M`.
const MIN_MOUSE_SEQ_LEN: usize = MOUSE_PREFIX.len() + 6;
/// The `M`/`m` terminator must appear within this many bytes of the prefix.
const MAX_MOUSE_BODY_LEN: usize = 14;

const FOCUS_IN: &[u8] = b"\x1b[I";
const FOCUS_OUT: &[u8] = b"\x1b[O";

pub const DEFAULT_DOUBLE_CLICK: Duration = Duration::from_millis(300);
pub const MIN_DOUBLE_CLICK: Duration = Duration::from_millis(10);

/// Residual bytes kept across reads are bounded; overflow drops the oldest.
const RING_CAPACITY: usize = 4096;

/// Result of one decode attempt against a byte slice.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    pub events: Vec<Event>,
    pub consumed: usize,
}

enum Step {
    Progress(Vec<Event>, usize),
    /// A valid sequence head whose tail has not arrived yet.
    Incomplete,
    /// Undecodable at this position.
    Unrecognized,
}

/// Button-0 press timing for double-click classification.
struct ClickTracker {
    last_press: Option<Instant>,
    window: Duration,
}

impl ClickTracker {
    /// Classify a button-0 press as `(pressed, double_clicked)`.
    ///
    /// Strictly-less-than: a press exactly at the window boundary is a new
    /// press. The stopwatch only resets on a plain press.
    fn classify(&mut self, now: Instant) -> (bool, bool) {
        let double = self
            .last_press
            .is_some_and(|last| now.duration_since(last) < self.window);
        if double {
            (false, true)
        } else {
            self.last_press = Some(now);
            (true, false)
        }
    }
}

/// Converts the raw stdin byte stream into typed events.
///
/// Bytes are appended to an internal ring with [`Decoder::push_bytes`];
/// [`Decoder::drain`] then commits as many events as the buffered bytes
/// allow, leaving any incomplete tail in place for the next read.
pub struct Decoder {
    key_table: Vec<KeySequence>,
    ring: VecDeque<u8>,
    clicks: ClickTracker,
}

impl Decoder {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            key_table: build_key_table()?,
            ring: VecDeque::new(),
            clicks: ClickTracker {
                last_press: None,
                window: DEFAULT_DOUBLE_CLICK,
            },
        })
    }

    /// Set the double-click window; values below 10 ms are clamped up.
    pub fn set_double_click_duration(&mut self, window: Duration) {
        self.clicks.window = window.max(MIN_DOUBLE_CLICK);
    }

    pub fn pending(&self) -> usize {
        self.ring.len()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.ring.extend(bytes);
        let excess = self.ring.len().saturating_sub(RING_CAPACITY);
        if excess > 0 {
            warn!("input ring overflow, dropping {excess} oldest bytes");
            self.ring.drain(..excess);
        }
    }

    /// One decode attempt at the head of `input`: the first rule that
    /// consumes bytes commits. On failure nothing is consumed and no events
    /// are produced.
    pub fn decode(&mut self, input: &[u8]) -> Decoded {
        match decode_step(&self.key_table, &mut self.clicks, input) {
            Step::Progress(events, consumed) => Decoded { events, consumed },
            Step::Incomplete => Decoded::default(),
            Step::Unrecognized => {
                warn!(
                    "parse failed: {} {} ({} bytes)",
                    safe(input),
                    hex(input),
                    input.len()
                );
                Decoded::default()
            }
        }
    }

    /// Commit every decodable event in the ring, in input order.
    ///
    /// An incomplete trailing sequence (a truncated UTF-8 codepoint or a
    /// mouse report split across reads) stays buffered. Unrecognized bytes
    /// are logged and dropped for this read.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            if self.ring.is_empty() {
                break;
            }
            self.ring.make_contiguous();

            let step = {
                let (head, _) = self.ring.as_slices();
                if mouse_report_pending(head) {
                    Step::Incomplete
                } else {
                    decode_step(&self.key_table, &mut self.clicks, head)
                }
            };

            match step {
                Step::Progress(batch, consumed) => {
                    self.ring.drain(..consumed);
                    events.extend(batch);
                }
                Step::Incomplete => break,
                Step::Unrecognized => {
                    let remaining: Vec<u8> = self.ring.iter().copied().collect();
                    warn!(
                        "parse failed: {} {} ({} bytes)",
                        safe(&remaining),
                        hex(&remaining),
                        remaining.len()
                    );
                    self.ring.clear();
                    break;
                }
            }
        }
        events
    }

    #[cfg(test)]
    fn set_last_press(&mut self, at: Instant) {
        self.clicks.last_press = Some(at);
    }
}

/// True when the buffered bytes start a mouse report whose terminator has
/// not arrived yet. Such a head must wait for the next read instead of
/// falling through to the lone-escape decoding.
fn mouse_report_pending(input: &[u8]) -> bool {
    if !input.starts_with(MOUSE_PREFIX) {
        // A strict prefix of `ESC [ <` is still ambiguous with arrow keys
        // and the focus reports; those resolve byte-by-byte as usual.
        return false;
    }
    let body = &input[MOUSE_PREFIX.len()..];
    let limit = body.len().min(MAX_MOUSE_BODY_LEN);
    let terminated = body[..limit]
        .iter()
        .any(|&byte| byte == b'M' || byte == b'm');
    !terminated && body.len() < MAX_MOUSE_BODY_LEN
}

fn decode_step(key_table: &[KeySequence], clicks: &mut ClickTracker, input: &[u8]) -> Step {
    if input.is_empty() {
        return Step::Incomplete;
    }

    // 1. SGR mouse report.
    if input.len() >= MIN_MOUSE_SEQ_LEN && input.starts_with(MOUSE_PREFIX) {
        if let Some((events, eaten)) = parse_mouse(&input[MOUSE_PREFIX.len()..], clicks) {
            return Step::Progress(events, MOUSE_PREFIX.len() + eaten);
        }
    }

    // 2. Focus reports.
    if input.starts_with(FOCUS_IN) {
        return Step::Progress(
            vec![Event::Focus(FocusEvent { focused: true })],
            FOCUS_IN.len(),
        );
    }
    if input.starts_with(FOCUS_OUT) {
        return Step::Progress(
            vec![Event::Focus(FocusEvent { focused: false })],
            FOCUS_OUT.len(),
        );
    }

    // 3. Key table, longest sequence first.
    for entry in key_table {
        if input.starts_with(&entry.sequence) {
            return Step::Progress(
                vec![Event::key(entry.key, entry.mods)],
                entry.sequence.len(),
            );
        }
    }

    // 4. One UTF-8 codepoint, plus a synthesized key for printable ASCII.
    match decode_one(input) {
        Utf8Step::Char { codepoint, len } => {
            let mut events = vec![Event::Input(InputEvent { codepoint })];
            if let Some(event) = synthesized_key(codepoint) {
                events.push(event);
            }
            Step::Progress(events, len)
        }
        Utf8Step::Incomplete => Step::Incomplete,
        Utf8Step::Invalid => Step::Unrecognized,
    }
}

/// Companion `Key` event for printable ASCII text input.
fn synthesized_key(codepoint: char) -> Option<Event> {
    match codepoint {
        'A'..='Z' => Key::from_letter(codepoint).map(|key| Event::key(key, Modifier::SHIFT)),
        'a'..='z' => Key::from_letter(codepoint).map(|key| Event::key(key, Modifier::empty())),
        '0'..='9' => Key::from_digit(codepoint).map(|key| Event::key(key, Modifier::empty())),
        ' ' => Some(Event::key(Key::Space, Modifier::empty())),
        _ => None,
    }
}

/// Parse the body of an SGR mouse report (`btn ; x ; y` then `M`/`m`).
///
/// Returns the events to emit and the bytes eaten past the prefix, or `None`
/// when the body is not a well-formed report (the caller falls through to
/// the other decode rules).
fn parse_mouse(
    body: &[u8],
    clicks: &mut ClickTracker,
) -> Option<(Vec<Event>, usize)> {
    let limit = body.len().min(MAX_MOUSE_BODY_LEN);
    let mut len = 0;
    let mut tail = 0u8;
    while len < limit {
        let byte = body[len];
        len += 1;
        if byte == b'M' || byte == b'm' {
            tail = byte;
            break;
        }
    }
    if !(tail == b'M' || tail == b'm') || len < 6 {
        return None;
    }

    let mut parts = body[..len - 1].split(|&byte| byte == b';');
    let buttons_modifiers = parse_decimal(parts.next()?)?;
    let wire_x = parse_decimal(parts.next()?)?;
    let wire_y = parse_decimal(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }

    // Coordinates are 1-based on the wire and delivered 0-based.
    let x = u16::try_from(wire_x.saturating_sub(1)).ok()?;
    let y = u16::try_from(wire_y.saturating_sub(1)).ok()?;

    let mut modifiers = Modifier::empty();
    if buttons_modifiers & 0x04 != 0 {
        modifiers |= Modifier::SHIFT;
    }
    if buttons_modifiers & 0x08 != 0 {
        modifiers |= Modifier::ALT;
    }
    if buttons_modifiers & 0x10 != 0 {
        modifiers |= Modifier::CTRL;
    }

    if buttons_modifiers & 0x20 != 0 {
        return Some((
            vec![Event::MouseMove(MouseMoveEvent { x, y, modifiers })],
            len,
        ));
    }

    let pressed_on_wire = tail == b'M';

    if buttons_modifiers >= 128 {
        // Extended buttons (6+).
        let button = ((buttons_modifiers & !0x80) + 5) as u8;
        return Some((
            vec![Event::MouseButton(MouseButtonEvent {
                button,
                pressed: pressed_on_wire,
                released: !pressed_on_wire,
                double_clicked: false,
                x,
                y,
                modifiers,
            })],
            len,
        ));
    }

    if buttons_modifiers >= 64 {
        // Only the vertical wheel pair (64/65) has defined semantics; other
        // wheel reports are consumed without an event.
        let delta = -((buttons_modifiers & !0x40) as i32) * 2 + 1;
        if delta == 1 || delta == -1 {
            return Some((
                vec![Event::MouseWheel(MouseWheelEvent {
                    delta,
                    x,
                    y,
                    modifiers,
                })],
                len,
            ));
        }
        debug!("unmapped wheel report btn={buttons_modifiers}");
        return Some((Vec::new(), len));
    }

    let button = (buttons_modifiers & 0x0f) as u8;
    let event = if pressed_on_wire {
        let (pressed, double_clicked) = if button == 0 {
            clicks.classify(Instant::now())
        } else {
            (true, false)
        };
        MouseButtonEvent {
            button,
            pressed,
            released: false,
            double_clicked,
            x,
            y,
            modifiers,
        }
    } else {
        MouseButtonEvent {
            button,
            pressed: false,
            released: true,
            double_clicked: false,
            x,
            y,
            modifiers,
        }
    };

    Some((vec![Event::MouseButton(event)], len))
}

fn parse_decimal(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(u32::from(byte - b'0'))?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{ClickTracker, Decoder, DEFAULT_DOUBLE_CLICK};
    use crate::core::event::{Event, FocusEvent, InputEvent};
    use crate::core::key::{Key, Modifier};

    fn decoder() -> Decoder {
        Decoder::new().expect("key table must build")
    }

    fn decode_all(bytes: &[u8]) -> Vec<Event> {
        let mut dec = decoder();
        dec.push_bytes(bytes);
        dec.drain()
    }

    #[test]
    fn scenario_plain_arrow() {
        assert_eq!(
            decode_all(b"\x1b\x5b\x41"),
            vec![Event::key(Key::Up, Modifier::empty())]
        );
    }

    #[test]
    fn scenario_ctrl_arrow() {
        assert_eq!(
            decode_all(b"\x1b\x5b\x31\x3b\x35\x41"),
            vec![Event::key(Key::Up, Modifier::CTRL)]
        );
    }

    #[test]
    fn scenario_mouse_press_and_release() {
        let press = decode_all(b"\x1b\x5b\x3c\x30\x3b\x31\x30\x3b\x35\x4d");
        match press.as_slice() {
            [Event::MouseButton(ev)] => {
                assert_eq!(ev.button, 0);
                assert!(ev.pressed);
                assert!(!ev.released);
                assert!(!ev.double_clicked);
                assert_eq!((ev.x, ev.y), (9, 4));
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let release = decode_all(b"\x1b\x5b\x3c\x30\x3b\x31\x30\x3b\x35\x6d");
        match release.as_slice() {
            [Event::MouseButton(ev)] => {
                assert!(!ev.pressed);
                assert!(ev.released);
                assert_eq!((ev.x, ev.y), (9, 4));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn scenario_printable_ascii_synthesizes_key() {
        assert_eq!(
            decode_all(b"\x61"),
            vec![
                Event::Input(InputEvent { codepoint: 'a' }),
                Event::key(Key::A, Modifier::empty()),
            ]
        );
        assert_eq!(
            decode_all(b"G"),
            vec![
                Event::Input(InputEvent { codepoint: 'G' }),
                Event::key(Key::G, Modifier::SHIFT),
            ]
        );
        assert_eq!(
            decode_all(b"7"),
            vec![
                Event::Input(InputEvent { codepoint: '7' }),
                Event::key(Key::Num7, Modifier::empty()),
            ]
        );
    }

    #[test]
    fn scenario_focus_events() {
        assert_eq!(
            decode_all(b"\x1b\x5b\x49"),
            vec![Event::Focus(FocusEvent { focused: true })]
        );
        assert_eq!(
            decode_all(b"\x1b[O"),
            vec![Event::Focus(FocusEvent { focused: false })]
        );
    }

    #[test]
    fn scenario_lone_and_double_escape() {
        assert_eq!(
            decode_all(b"\x1b"),
            vec![Event::key(Key::Escape, Modifier::empty())]
        );
        assert_eq!(
            decode_all(b"\x1b\x1b"),
            vec![Event::key(Key::Escape, Modifier::ALT)]
        );
    }

    #[test]
    fn non_ascii_input_has_no_companion_key() {
        assert_eq!(
            decode_all("é".as_bytes()),
            vec![Event::Input(InputEvent { codepoint: 'é' })]
        );
    }

    #[test]
    fn every_key_table_entry_decodes_to_its_key() {
        let table = crate::core::key::build_key_table().expect("key table must build");
        for entry in &table {
            let mut dec = decoder();
            let decoded = dec.decode(&entry.sequence);
            assert_eq!(
                decoded.consumed,
                entry.sequence.len(),
                "entry {:?} left unconsumed bytes",
                entry
            );
            assert_eq!(
                decoded.events,
                vec![Event::key(entry.key, entry.mods)],
                "entry {:?} decoded wrong",
                entry
            );
        }
    }

    #[test]
    fn wheel_reports_decode_to_unit_deltas() {
        match decode_all(b"\x1b[<64;3;4M").as_slice() {
            [Event::MouseWheel(ev)] => {
                assert_eq!(ev.delta, 1);
                assert_eq!((ev.x, ev.y), (2, 3));
            }
            other => panic!("unexpected events: {other:?}"),
        }
        match decode_all(b"\x1b[<65;3;4M").as_slice() {
            [Event::MouseWheel(ev)] => assert_eq!(ev.delta, -1),
            other => panic!("unexpected events: {other:?}"),
        }
        // Horizontal wheel reports are consumed without an event.
        assert!(decode_all(b"\x1b[<66;3;4M").is_empty());
    }

    #[test]
    fn motion_reports_become_mouse_moves() {
        match decode_all(b"\x1b[<35;20;5M").as_slice() {
            [Event::MouseMove(ev)] => {
                assert_eq!((ev.x, ev.y), (19, 4));
                assert_eq!(ev.modifiers, Modifier::empty());
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn mouse_modifier_bits_map_to_mask() {
        match decode_all(b"\x1b[<16;2;2M").as_slice() {
            [Event::MouseButton(ev)] => {
                assert_eq!(ev.button, 0);
                assert_eq!(ev.modifiers, Modifier::CTRL);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        match decode_all(b"\x1b[<40;2;2M").as_slice() {
            // 40 = motion | alt
            [Event::MouseMove(ev)] => assert_eq!(ev.modifiers, Modifier::ALT),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn extended_buttons_offset_by_five() {
        match decode_all(b"\x1b[<131;1;1M").as_slice() {
            [Event::MouseButton(ev)] => {
                assert_eq!(ev.button, 8);
                assert!(ev.pressed);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn double_click_within_window() {
        let mut dec = decoder();
        dec.push_bytes(b"\x1b[<0;1;1M");
        let first = dec.drain();
        match first.as_slice() {
            [Event::MouseButton(ev)] => assert!(ev.pressed && !ev.double_clicked),
            other => panic!("unexpected events: {other:?}"),
        }

        dec.set_last_press(Instant::now());
        dec.push_bytes(b"\x1b[<0;1;1M");
        match dec.drain().as_slice() {
            [Event::MouseButton(ev)] => {
                assert!(!ev.pressed);
                assert!(ev.double_clicked);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn double_click_boundary_is_strictly_less_than() {
        let mut clicks = ClickTracker {
            last_press: None,
            window: DEFAULT_DOUBLE_CLICK,
        };
        let start = Instant::now();
        assert_eq!(clicks.classify(start), (true, false));

        // Exactly at the boundary: a new press.
        assert_eq!(clicks.classify(start + DEFAULT_DOUBLE_CLICK), (true, false));
        // Strictly inside the window: a double click.
        assert_eq!(
            clicks.classify(start + DEFAULT_DOUBLE_CLICK + Duration::from_millis(1)),
            (false, true)
        );
    }

    #[test]
    fn only_button_zero_participates_in_double_click() {
        let mut dec = decoder();
        dec.push_bytes(b"\x1b[<1;1;1M");
        dec.drain();
        dec.set_last_press(Instant::now());
        dec.push_bytes(b"\x1b[<1;1;1M");
        match dec.drain().as_slice() {
            // Button 1 presses never classify as double clicks.
            [Event::MouseButton(ev)] => assert!(ev.pressed && !ev.double_clicked),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn split_mouse_report_waits_for_terminator() {
        let mut dec = decoder();
        dec.push_bytes(b"\x1b[<0;10");
        assert!(dec.drain().is_empty());
        assert_eq!(dec.pending(), 7);

        dec.push_bytes(b";5M");
        match dec.drain().as_slice() {
            [Event::MouseButton(ev)] => assert_eq!((ev.x, ev.y), (9, 4)),
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(dec.pending(), 0);
    }

    #[test]
    fn split_utf8_codepoint_waits_for_continuation() {
        let mut dec = decoder();
        let emoji = "🎉".as_bytes();
        dec.push_bytes(&emoji[..2]);
        assert!(dec.drain().is_empty());
        assert_eq!(dec.pending(), 2);

        dec.push_bytes(&emoji[2..]);
        assert_eq!(
            dec.drain(),
            vec![Event::Input(InputEvent { codepoint: '🎉' })]
        );
    }

    #[test]
    fn unrecognized_bytes_are_dropped_for_the_read() {
        let mut dec = decoder();
        dec.push_bytes(b"a\xff\xfe");
        let events = dec.drain();
        assert_eq!(
            events,
            vec![
                Event::Input(InputEvent { codepoint: 'a' }),
                Event::key(Key::A, Modifier::empty()),
            ]
        );
        assert_eq!(dec.pending(), 0, "garbage must not linger in the ring");
    }

    #[test]
    fn decode_consumes_at_most_the_input() {
        let mut dec = decoder();
        let input = b"\x1b[Axyz";
        let decoded = dec.decode(input);
        assert!(decoded.consumed <= input.len());
        assert_eq!(decoded.consumed, 3);
        assert_eq!(decoded.events, vec![Event::key(Key::Up, Modifier::empty())]);
    }

    #[test]
    fn batch_preserves_input_order() {
        let events = decode_all(b"a\x1b[Ab");
        assert_eq!(
            events,
            vec![
                Event::Input(InputEvent { codepoint: 'a' }),
                Event::key(Key::A, Modifier::empty()),
                Event::key(Key::Up, Modifier::empty()),
                Event::Input(InputEvent { codepoint: 'b' }),
                Event::key(Key::B, Modifier::empty()),
            ]
        );
    }

    #[test]
    fn malformed_mouse_body_falls_through_to_escape() {
        // Terminator present but the body is not `btn;x;y`: the report is
        // rejected and the bytes decode through the other rules.
        let events = decode_all(b"\x1b[<0;10;5;9M");
        assert!(
            events
                .first()
                .is_some_and(|ev| *ev == Event::key(Key::Escape, Modifier::empty())),
            "expected fallthrough to lone escape, got {events:?}"
        );
    }
}
