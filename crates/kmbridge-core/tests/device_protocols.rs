//! Integration tests for the kmbridge-core codecs and state machines.
//!
//! These tests drive several modules together through the public API, the way
//! a backend does: resolve a key, quantize a move, encode a command, and feed
//! a device's status stream into the button table.

use kmbridge_core::protocol::km_text::KmCommand;
use kmbridge_core::protocol::{arduino, binary, dhz, ferrum};
use kmbridge_core::{
    format_vid_pid, parse_vid_pid, ButtonStateTable, Channel, KeyMapper, KeyRef, MouseButton,
    MovementQuantizer,
};

#[test]
fn test_key_name_resolves_to_makcu_key_command() {
    // Arrange
    let key = KeyRef::from("a");

    // Act
    let hid = KeyMapper::to_hid(&key).expect("letter must resolve");
    let line = KmCommand::KeyDown(hid).encode();

    // Assert
    assert_eq!(line, b"km.down(4)\r".to_vec());
}

#[test]
fn test_key_name_resolves_to_dhz_token_and_queries() {
    // Arrange
    let key = KeyRef::from("esc");

    // Act
    let token = KeyMapper::to_symbolic_token(&key).expect("alias must resolve");
    let queries = dhz::key_queries(&token, KeyMapper::to_hid(&key));

    // Assert
    assert_eq!(token, "ESC");
    assert_eq!(queries.first().map(String::as_str), Some("isdown2(ESC)"));
    assert!(queries.contains(&"isdown(41)".to_string()));
}

#[test]
fn test_quantized_moves_never_drift() {
    // Arrange
    let mut quantizer = MovementQuantizer::new();
    let mut emitted = (0i64, 0i64);
    let mut requested = (0f64, 0f64);

    // Act
    for i in 0..1000 {
        let dx = 0.37 + (i % 7) as f64 * 0.11;
        let dy = -0.61 + (i % 3) as f64 * 0.2;
        requested.0 += dx;
        requested.1 += dy;
        let (ix, iy) = quantizer.quantize(Channel::Main, dx, dy);
        emitted.0 += i64::from(ix);
        emitted.1 += i64::from(iy);
    }

    // Assert
    assert!((emitted.0 as f64 - requested.0).abs() < 1.0);
    assert!((emitted.1 as f64 - requested.1).abs() < 1.0);
}

#[test]
fn test_arduino_eight_bit_move_emits_one_line_per_step() {
    // Arrange / Act
    let lines: Vec<Vec<u8>> = arduino::segment_move(300, 0)
        .into_iter()
        .map(|(x, y)| arduino::move_line(x, y))
        .collect();

    // Assert
    assert_eq!(
        lines,
        vec![b"m127,0\n".to_vec(), b"m127,0\n".to_vec(), b"m46,0\n".to_vec()]
    );
}

#[test]
fn test_binary_status_stream_updates_button_table() {
    // Arrange
    let mut decoder = binary::StatusDecoder::new();
    let mut table = ButtonStateTable::new();
    let stream = [0x00, 0x02, 0x03, b'\r', b'\n', 0x02, 0x03, 0x01];

    // Act
    let mut transitions = Vec::new();
    for byte in stream {
        if let Some(mask) = decoder.feed(byte) {
            transitions.extend(table.apply_mask(mask));
        }
    }

    // Assert
    assert_eq!(transitions.len(), 3);
    assert!(table.is_pressed(MouseButton::Left));
    assert!(!table.is_pressed(MouseButton::Right));
}

#[test]
fn test_ferrum_stream_sets_full_mask_and_ignores_text() {
    // Arrange
    let mut table = ButtonStateTable::new();
    let stream = b"km.version()\r\nferrum\r\n\x05>>> ";

    // Act
    for &byte in stream.iter() {
        if let Some(mask) = ferrum::status_mask(byte) {
            table.apply_mask(mask);
        }
    }

    // Assert
    assert!(table.is_pressed(MouseButton::Left));
    assert!(table.is_pressed(MouseButton::Middle));
    assert!(!table.is_pressed(MouseButton::Right));
}

#[test]
fn test_vid_pid_survives_format_and_parse() {
    let text = format_vid_pid(0x1A86, 0x55D3);

    assert_eq!(text, "0x1A86/0x55D3");
    assert_eq!(parse_vid_pid(&text, (0, 0), true), Ok((0x1A86, 0x55D3)));
}
