//! Ferrum serial text protocol.
//!
//! Commands look like the MAKCU ones (`km.<name>(<args>)\r`) but use their own
//! names and a bit-valued button code instead of per-button commands.  The
//! device echoes each command, prints the result, and ends with a `>>>`
//! prompt.  Button state is pushed as raw control bytes mixed into that text.

use crate::domain::buttons::MouseButton;

use super::km_text::KM_PREFIX;

/// Prompt that ends every reply.
pub const PROMPT: &str = ">>>";

/// Ferrum button code for `button` (1, 2, 4, 8, 16).
pub fn button_code(button: MouseButton) -> u8 {
    button.mask()
}

/// Encodes a command, adding the `km.` prefix when it is missing.
pub fn encode(cmd: &str) -> Vec<u8> {
    let mut line = if cmd.starts_with(KM_PREFIX) {
        cmd.to_string()
    } else {
        format!("{KM_PREFIX}{cmd}")
    };
    line.push('\r');
    line.into_bytes()
}

// ── Command texts ─────────────────────────────────────────────────────────────

/// Relative move; deltas are clamped to the `i16` range the firmware accepts.
pub fn move_cmd(dx: i32, dy: i32) -> String {
    let clamp = |v: i32| v.clamp(i16::MIN as i32, i16::MAX as i32);
    format!("mouse_move({},{})", clamp(dx), clamp(dy))
}

pub fn button_cmd(button: MouseButton, pressed: bool) -> String {
    let verb = if pressed { "press" } else { "release" };
    format!("mouse_button_{verb}({})", button_code(button))
}

pub fn key_down_cmd(hid: u32) -> String {
    format!("key_press({hid})")
}

pub fn key_up_cmd(hid: u32) -> String {
    format!("key_release({hid})")
}

pub fn key_click_cmd(hid: u32) -> String {
    format!("key_click({hid})")
}

pub fn key_block_cmd(hid: u32, blocked: bool) -> String {
    format!("key_block({hid},{})", u8::from(blocked))
}

pub fn key_query_cmd(hid: u32) -> String {
    format!("key_is_pressed({hid})")
}

pub const VERSION_CMD: &str = "version()";

// ── Replies ───────────────────────────────────────────────────────────────────

/// Reads a key-state reply.
///
/// The echoed command and the prompt are removed first.  What is left counts
/// as pressed when it contains `true` (any case) or a `1`.  An empty
/// remainder means no answer yet.
pub fn parse_key_state_reply(reply: &str, cmd: &str) -> Option<bool> {
    let body = reply
        .replace(&format!("{KM_PREFIX}{cmd}"), "")
        .replace(cmd, "")
        .replace(PROMPT, "");
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    Some(body.to_ascii_lowercase().contains("true") || body.contains('1'))
}

/// Returns `true` once `reply` holds a complete answer to `cmd`.
///
/// A reply is complete at the prompt, or when it has both line-break bytes
/// and is longer than the echo plus a few characters.
pub fn is_reply_complete(reply: &str, cmd: &str) -> bool {
    reply.contains(PROMPT)
        || (reply.contains('\r') && reply.contains('\n') && reply.len() > cmd.len() + 5)
}

/// Classifies one pushed byte.
///
/// Control bytes other than line breaks and space carry a full five-button
/// mask; everything else is reply text.
pub fn status_mask(byte: u8) -> Option<u8> {
    if byte < 32 && !matches!(byte, 0x0A | 0x0D | 0x20) {
        Some(byte)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_adds_prefix_once() {
        assert_eq!(encode("mouse_move(1,2)"), b"km.mouse_move(1,2)\r".to_vec());
        assert_eq!(encode("km.version()"), b"km.version()\r".to_vec());
    }

    #[test]
    fn test_button_codes_are_single_bits() {
        let codes: Vec<u8> = MouseButton::ALL.iter().map(|&b| button_code(b)).collect();
        assert_eq!(codes, vec![1, 2, 4, 8, 16]);
        assert_eq!(button_cmd(MouseButton::Middle, true), "mouse_button_press(4)");
        assert_eq!(button_cmd(MouseButton::Side2, false), "mouse_button_release(16)");
    }

    #[test]
    fn test_move_cmd_clamps() {
        assert_eq!(move_cmd(40_000, -3), "mouse_move(32767,-3)");
    }

    #[test]
    fn test_key_commands() {
        assert_eq!(key_down_cmd(4), "key_press(4)");
        assert_eq!(key_up_cmd(4), "key_release(4)");
        assert_eq!(key_click_cmd(4), "key_click(4)");
        assert_eq!(key_block_cmd(4, true), "key_block(4,1)");
        assert_eq!(key_block_cmd(4, false), "key_block(4,0)");
    }

    #[test]
    fn test_parse_key_state_reply_strips_echo() {
        // Arrange
        let cmd = key_query_cmd(21);

        // Act / Assert
        assert_eq!(parse_key_state_reply("km.key_is_pressed(21)\r\nTrue\r\n>>> ", &cmd), Some(true));
        assert_eq!(parse_key_state_reply("km.key_is_pressed(21)\r\n0\r\n>>> ", &cmd), Some(false));
        assert_eq!(parse_key_state_reply("km.key_is_pressed(21)\r\n", &cmd), None);
    }

    #[test]
    fn test_reply_completion() {
        let cmd = key_query_cmd(4);
        assert!(is_reply_complete("x>>>", &cmd));
        assert!(!is_reply_complete("km.key_is_pressed(4)\r\n", &cmd));
        assert!(is_reply_complete("km.key_is_pressed(4)\r\nfalse\r\n", &cmd));
    }

    #[test]
    fn test_status_mask_filters_text() {
        assert_eq!(status_mask(0x01), Some(0x01));
        assert_eq!(status_mask(0x00), Some(0x00));
        assert_eq!(status_mask(0x0D), None);
        assert_eq!(status_mask(b'k'), None);
    }
}
