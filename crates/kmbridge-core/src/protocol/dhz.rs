//! DHZ box UDP text protocol.
//!
//! Commands are bare `name(args)` strings, one per datagram, rotated through
//! a Caesar shift that the box is configured with (`RANDOM` in its settings).
//! Upper- and lower-case letters rotate independently; everything else
//! passes through.  The rotation keeps the box compatible with its vendor
//! tooling and provides no confidentiality.
//!
//! Replies come back rotated too, but firmware revisions disagree on which
//! direction, so [`response_candidates`] yields every plausible decoding and
//! [`parse_bool`] scans each for a yes/no token.

use crate::domain::buttons::MouseButton;

/// Default UDP port of a DHZ box.
pub const DEFAULT_PORT: u16 = 5000;

/// Rotates ASCII letters by `shift` positions (mod 26).
pub fn caesar_shift(text: &str, shift: i32) -> String {
    let shift = shift.rem_euclid(26) as u8;
    text.chars()
        .map(|ch| match ch {
            'A'..='Z' => (((ch as u8 - b'A') + shift) % 26 + b'A') as char,
            'a'..='z' => (((ch as u8 - b'a') + shift) % 26 + b'a') as char,
            other => other,
        })
        .collect()
}

/// Encodes a command for the wire.
///
/// Non-ASCII characters are dropped, matching the box's ASCII-only parser.
pub fn encode_command(command: &str, shift: i32) -> Vec<u8> {
    caesar_shift(command, shift)
        .chars()
        .filter(char::is_ascii)
        .map(|c| c as u8)
        .collect()
}

/// Decodes a raw reply with the inverse rotation.
///
/// Falls back to the raw text when decoding produces nothing.
pub fn decode_response(raw: &[u8], shift: i32) -> String {
    let text: String = raw.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect();
    let decoded = caesar_shift(&text, -shift);
    if decoded.is_empty() {
        text
    } else {
        decoded
    }
}

/// The three texts a reply is tried as: as received, rotated forward and
/// rotated backward.
pub fn response_candidates(response: &str, shift: i32) -> [String; 3] {
    [
        response.to_string(),
        caesar_shift(response, shift),
        caesar_shift(response, -shift),
    ]
}

const TRUE_TOKENS: [&str; 5] = ["1", "true", "yes", "down", "pressed"];
const FALSE_TOKENS: [&str; 5] = ["0", "false", "no", "up", "released"];

/// Reads a boolean out of a reply.
///
/// The whole trimmed, lower-cased reply is checked first.  Failing that, the
/// reply is split on non-alphanumeric characters and the first recognised
/// token wins.
pub fn parse_bool(text: &str) -> Option<bool> {
    let normalized = text.trim().to_ascii_lowercase();
    let classify = |token: &str| {
        if TRUE_TOKENS.contains(&token) {
            Some(true)
        } else if FALSE_TOKENS.contains(&token) {
            Some(false)
        } else {
            None
        }
    };
    if let Some(value) = classify(&normalized) {
        return Some(value);
    }
    normalized
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(classify)
}

/// Tries every candidate decoding of a reply and returns the first boolean.
pub fn parse_bool_response(response: &str, shift: i32) -> Option<bool> {
    response_candidates(response, shift)
        .iter()
        .find_map(|candidate| parse_bool(candidate))
}

// ── Command texts ─────────────────────────────────────────────────────────────

pub fn move_cmd(dx: i32, dy: i32) -> String {
    format!("move({dx},{dy})")
}

pub fn button_cmd(button: MouseButton, pressed: bool) -> String {
    format!("{}({})", button.name(), u8::from(pressed))
}

pub fn wheel_cmd(delta: i32) -> String {
    format!("wheel({delta})")
}

pub fn key_down_cmd(token: &str) -> String {
    format!("keydown({token})")
}

pub fn key_up_cmd(token: &str) -> String {
    format!("keyup({token})")
}

pub fn mask_key_cmd(token: &str) -> String {
    format!("mask_keyboard({token})")
}

pub fn unmask_key_cmd(token: &str) -> String {
    format!("dismask_keyboard({token})")
}

pub const UNMASK_ALL_CMD: &str = "dismask_keyboard_all()";

/// Sent on disconnect to stop the box's own monitor stream.
pub const MONITOR_OFF_CMD: &str = "monitor(0)";

/// Per-button state query.
pub fn button_query(button: MouseButton) -> String {
    format!("isdown_{}()", button.name())
}

/// The key-state queries to try, in order, without duplicates.
///
/// `isdown2` is the newer firmware's query; `isdown` the older one.  Both are
/// tried with the symbolic token and then with the decimal HID code.
pub fn key_queries(token: &str, hid: Option<u32>) -> Vec<String> {
    let mut queries = vec![format!("isdown2({token})"), format!("isdown({token})")];
    if let Some(hid) = hid {
        queries.push(format!("isdown2({hid})"));
        queries.push(format!("isdown({hid})"));
    }
    let mut seen = std::collections::HashSet::new();
    queries.retain(|q| seen.insert(q.clone()));
    queries
}
