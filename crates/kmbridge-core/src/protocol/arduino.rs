//! Line protocol of the Arduino HID sketch.
//!
//! Outgoing lines:
//! ```text
//! m{dx},{dy}\n   relative move
//! p\n            left down
//! r\n            left up
//! c\n            left click
//! ```
//! Incoming lines report physical button changes as `BD:n` (down) or
//! `BU:n` (up).  `n` is 1-based, though some sketches send `0` for left.
//!
//! Boards flashed with an 8-bit HID report can only move ±127 per report, so
//! in that mode a move is split into chunks by [`segment_move`].

use crate::domain::buttons::MouseButton;

use super::ProtocolError;

/// Largest per-report step of an 8-bit HID mouse.
pub const MAX_STEP: i32 = 127;

pub fn move_line(dx: i32, dy: i32) -> Vec<u8> {
    format!("m{dx},{dy}\n").into_bytes()
}

pub fn left_line(pressed: bool) -> Vec<u8> {
    if pressed {
        b"p\n".to_vec()
    } else {
        b"r\n".to_vec()
    }
}

pub fn click_line() -> Vec<u8> {
    b"c\n".to_vec()
}

/// Splits one axis into ±127 steps followed by the remainder.
///
/// The remainder is always present, so `split_axis(0)` is `[0]` and
/// `split_axis(254)` is `[127, 127, 0]`.
pub fn split_axis(delta: i32) -> Vec<i32> {
    let mut remaining = delta;
    let mut chunks = Vec::new();
    while remaining > MAX_STEP {
        chunks.push(MAX_STEP);
        remaining -= MAX_STEP;
    }
    while remaining < -MAX_STEP {
        chunks.push(-MAX_STEP);
        remaining += MAX_STEP;
    }
    chunks.push(remaining);
    chunks
}

/// Splits a move into 8-bit sized steps.
///
/// The axes are zipped with zero padding on the shorter one and `(0, 0)`
/// steps are dropped.
pub fn segment_move(dx: i32, dy: i32) -> Vec<(i32, i32)> {
    let xs = split_axis(dx);
    let ys = split_axis(dy);
    let count = xs.len().max(ys.len());
    (0..count)
        .map(|i| (xs.get(i).copied().unwrap_or(0), ys.get(i).copied().unwrap_or(0)))
        .filter(|&step| step != (0, 0))
        .collect()
}

/// A decoded `BD:n` / `BU:n` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: MouseButton,
    pub pressed: bool,
}

/// Parses one incoming line.
///
/// Returns `Ok(None)` for blank lines and sketch chatter that is not a
/// button event.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedCommand`] for a `BD`/`BU` line whose
/// index is not a button.
pub fn parse_line(line: &str) -> Result<Option<ButtonEvent>, ProtocolError> {
    let Some((event, index)) = line.trim().split_once(':') else {
        return Ok(None);
    };
    let pressed = match event.trim().to_ascii_uppercase().as_str() {
        "BD" => true,
        "BU" => false,
        _ => return Ok(None),
    };
    let raw: i64 = index
        .trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedCommand(line.trim().to_string()))?;
    let index = match raw {
        0 => 0,
        1..=5 => (raw - 1) as usize,
        _ => return Err(ProtocolError::MalformedCommand(line.trim().to_string())),
    };
    let button = MouseButton::from_index(index)
        .ok_or_else(|| ProtocolError::MalformedCommand(line.trim().to_string()))?;
    Ok(Some(ButtonEvent { button, pressed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_axis_300_gives_two_full_steps_and_remainder() {
        assert_eq!(split_axis(300), vec![127, 127, 46]);
        assert_eq!(split_axis(-130), vec![-127, -3]);
        assert_eq!(split_axis(5), vec![5]);
    }

    #[test]
    fn test_segment_move_pads_and_skips_zero_steps() {
        // Arrange / Act
        let steps = segment_move(300, 10);

        // Assert
        assert_eq!(steps, vec![(127, 10), (127, 0), (46, 0)]);
    }

    #[test]
    fn test_segment_move_drops_exact_multiple_remainder() {
        assert_eq!(segment_move(254, 0), vec![(127, 0), (127, 0)]);
        assert!(segment_move(0, 0).is_empty());
    }

    #[test]
    fn test_segments_sum_to_the_requested_move() {
        for (dx, dy) in [(300, -500), (-1, 1), (127, -127), (1000, 3)] {
            let steps = segment_move(dx, dy);
            let sum = steps.iter().fold((0, 0), |acc, s| (acc.0 + s.0, acc.1 + s.1));
            assert_eq!(sum, (dx, dy));
            assert!(steps.iter().all(|s| s.0.abs() <= MAX_STEP && s.1.abs() <= MAX_STEP));
        }
    }

    #[test]
    fn test_output_lines() {
        assert_eq!(move_line(-3, 4), b"m-3,4\n".to_vec());
        assert_eq!(left_line(true), b"p\n".to_vec());
        assert_eq!(left_line(false), b"r\n".to_vec());
        assert_eq!(click_line(), b"c\n".to_vec());
    }

    #[test]
    fn test_parse_line_button_events() {
        assert_eq!(
            parse_line("BD:1\r"),
            Ok(Some(ButtonEvent { button: MouseButton::Left, pressed: true }))
        );
        assert_eq!(
            parse_line("bu:2"),
            Ok(Some(ButtonEvent { button: MouseButton::Right, pressed: false }))
        );
        assert_eq!(
            parse_line("BD:0"),
            Ok(Some(ButtonEvent { button: MouseButton::Left, pressed: true }))
        );
    }

    #[test]
    fn test_parse_line_ignores_chatter_and_rejects_bad_index() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("ready"), Ok(None));
        assert_eq!(parse_line("LOG:hello"), Ok(None));
        assert!(parse_line("BD:9").is_err());
        assert!(parse_line("BD:x").is_err());
    }
}
