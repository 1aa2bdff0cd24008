//! Golden decode table: raw byte sequences against their expected events.

use termix::{Decoder, Event, FocusEvent, InputEvent, Key, Modifier};

struct Scenario {
    name: &'static str,
    input: &'static [u8],
    expected: Vec<Event>,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "plain arrow up",
            input: b"\x1b\x5b\x41",
            expected: vec![Event::key(Key::Up, Modifier::empty())],
        },
        Scenario {
            name: "ctrl arrow up",
            input: b"\x1b\x5b\x31\x3b\x35\x41",
            expected: vec![Event::key(Key::Up, Modifier::CTRL)],
        },
        Scenario {
            name: "printable ascii letter",
            input: b"\x61",
            expected: vec![
                Event::Input(InputEvent { codepoint: 'a' }),
                Event::key(Key::A, Modifier::empty()),
            ],
        },
        Scenario {
            name: "focus in",
            input: b"\x1b\x5b\x49",
            expected: vec![Event::Focus(FocusEvent { focused: true })],
        },
        Scenario {
            name: "focus out",
            input: b"\x1b\x5b\x4f",
            expected: vec![Event::Focus(FocusEvent { focused: false })],
        },
        Scenario {
            name: "lone escape",
            input: b"\x1b",
            expected: vec![Event::key(Key::Escape, Modifier::empty())],
        },
        Scenario {
            name: "double escape is alt escape",
            input: b"\x1b\x1b",
            expected: vec![Event::key(Key::Escape, Modifier::ALT)],
        },
        Scenario {
            name: "shift tab",
            input: b"\x1b[Z",
            expected: vec![Event::key(Key::Tab, Modifier::SHIFT)],
        },
        Scenario {
            name: "ctrl letter",
            input: b"\x03",
            expected: vec![Event::key(Key::C, Modifier::CTRL)],
        },
        Scenario {
            name: "alt letter",
            input: b"\x1bg",
            expected: vec![Event::key(Key::G, Modifier::ALT)],
        },
        Scenario {
            name: "alt shift letter",
            input: b"\x1bG",
            expected: vec![Event::key(Key::G, Modifier::ALT | Modifier::SHIFT)],
        },
        Scenario {
            name: "f12 with every modifier",
            input: b"\x1b[24;8~",
            expected: vec![Event::key(
                Key::F12,
                Modifier::SHIFT | Modifier::ALT | Modifier::CTRL,
            )],
        },
        Scenario {
            name: "ss3 f1",
            input: b"\x1bOP",
            expected: vec![Event::key(Key::F1, Modifier::empty())],
        },
        Scenario {
            name: "ctrl shift right",
            input: b"\x1b[1;6C",
            expected: vec![Event::key(Key::Right, Modifier::CTRL | Modifier::SHIFT)],
        },
        Scenario {
            name: "delete with ctrl",
            input: b"\x1b[3;5~",
            expected: vec![Event::key(Key::Delete, Modifier::CTRL)],
        },
        Scenario {
            name: "enter carriage return",
            input: b"\x0d",
            expected: vec![Event::key(Key::Enter, Modifier::empty())],
        },
        Scenario {
            name: "backspace",
            input: b"\x7f",
            expected: vec![Event::key(Key::Backspace, Modifier::empty())],
        },
        Scenario {
            name: "multibyte codepoint has no companion key",
            input: "漢".as_bytes(),
            expected: vec![Event::Input(InputEvent { codepoint: '漢' })],
        },
    ]
}

#[test]
fn decode_scenarios_match_expected_events() {
    for scenario in scenarios() {
        let mut decoder = Decoder::new().expect("key table must build");
        decoder.push_bytes(scenario.input);
        let events = decoder.drain();
        assert_eq!(
            events, scenario.expected,
            "scenario '{}' decoded wrong",
            scenario.name
        );
        assert_eq!(
            decoder.pending(),
            0,
            "scenario '{}' left bytes in the ring",
            scenario.name
        );
    }
}

#[test]
fn mouse_scenarios_roundtrip_wire_coordinates() {
    let mut decoder = Decoder::new().expect("key table must build");

    decoder.push_bytes(b"\x1b\x5b\x3c\x30\x3b\x31\x30\x3b\x35\x4d");
    match decoder.drain().as_slice() {
        [Event::MouseButton(ev)] => {
            assert_eq!(ev.button, 0);
            assert!(ev.pressed);
            assert_eq!((ev.x, ev.y), (9, 4), "wire 10;5 must deliver 0-based");
        }
        other => panic!("unexpected press decode: {other:?}"),
    }

    decoder.push_bytes(b"\x1b\x5b\x3c\x30\x3b\x31\x30\x3b\x35\x6d");
    match decoder.drain().as_slice() {
        [Event::MouseButton(ev)] => {
            assert!(ev.released);
            assert!(!ev.pressed);
        }
        other => panic!("unexpected release decode: {other:?}"),
    }

    // Wire minimum 1;1 maps to origin.
    decoder.push_bytes(b"\x1b[<0;1;1m");
    match decoder.drain().as_slice() {
        [Event::MouseButton(ev)] => assert_eq!((ev.x, ev.y), (0, 0)),
        other => panic!("unexpected origin decode: {other:?}"),
    }
}

#[test]
fn consumed_never_exceeds_input() {
    let inputs: &[&[u8]] = &[
        b"",
        b"\x1b",
        b"\x1b[",
        b"\x1b[A",
        b"\x1b[Axyz",
        b"\x1b[<0;10;5M",
        b"hello",
        b"\xff\xfe",
        "漢字".as_bytes(),
    ];
    for input in inputs {
        let mut decoder = Decoder::new().expect("key table must build");
        let decoded = decoder.decode(input);
        assert!(
            decoded.consumed <= input.len(),
            "decode consumed past the input for {input:?}"
        );
    }
}

#[test]
fn interleaved_batches_keep_input_order() {
    let mut decoder = Decoder::new().expect("key table must build");
    decoder.push_bytes(b"a\x1b[<64;2;2M\x1b[1;5A ");
    let events = decoder.drain();

    let kinds: Vec<&'static str> = events
        .iter()
        .map(|event| match event {
            Event::Input(_) => "input",
            Event::Key(_) => "key",
            Event::MouseWheel(_) => "wheel",
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(kinds, vec!["input", "key", "wheel", "key", "input", "key"]);
}

#[test]
fn split_reads_reassemble_sequences() {
    let mut decoder = Decoder::new().expect("key table must build");

    decoder.push_bytes(b"\x1b[<0;1");
    assert!(decoder.drain().is_empty());

    decoder.push_bytes(b"2;7M");
    match decoder.drain().as_slice() {
        [Event::MouseButton(ev)] => assert_eq!((ev.x, ev.y), (11, 6)),
        other => panic!("unexpected decode after reassembly: {other:?}"),
    }

    let emoji = "🎉".as_bytes();
    decoder.push_bytes(&emoji[..3]);
    assert!(decoder.drain().is_empty());
    decoder.push_bytes(&emoji[3..]);
    assert_eq!(
        decoder.drain(),
        vec![Event::Input(InputEvent { codepoint: '🎉' })]
    );
}
