//! Key code translation between symbolic names, Windows VK codes and USB HID
//! Usage IDs.
//!
//! Callers name keys however is convenient: a raw integer, a bare name
//! (`"SPACE"`, `"esc"`, `"LCTRL"`), or a name with an explicit code-space
//! prefix (`"VK_SPACE"`, `"HID:44"`, `"vk 0x20"`).  Each backend then asks
//! [`KeyMapper`] for the representation its wire protocol needs.
//!
//! # Resolution rules
//!
//! | Input                 | `to_vk`                          | `to_hid`                          |
//! |-----------------------|----------------------------------|-----------------------------------|
//! | integer `n >= 0`      | `n` unchanged                    | `n` unchanged                     |
//! | `HID…` prefix         | resolve as HID, convert to VK    | resolve body                      |
//! | `VK…` prefix          | resolve body                     | resolve as VK, convert to HID     |
//! | numeric text          | parsed value (`0x`/`0o`/`0b` ok) | parsed value                      |
//! | name                  | VK table, else HID table → VK    | HID table, else VK table → HID    |
//!
//! Anything else resolves to `None`.

pub mod hid;
pub mod names;
pub mod windows_vk;

use serde::{Deserialize, Serialize};

pub use hid::HidKeyCode;

/// A key as supplied by a caller: either a raw code or text to be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyRef {
    Code(i64),
    Name(String),
}

impl From<i64> for KeyRef {
    fn from(value: i64) -> Self {
        KeyRef::Code(value)
    }
}

impl From<i32> for KeyRef {
    fn from(value: i32) -> Self {
        KeyRef::Code(i64::from(value))
    }
}

impl From<u32> for KeyRef {
    fn from(value: u32) -> Self {
        KeyRef::Code(i64::from(value))
    }
}

impl From<u8> for KeyRef {
    fn from(value: u8) -> Self {
        KeyRef::Code(i64::from(value))
    }
}

impl From<HidKeyCode> for KeyRef {
    fn from(value: HidKeyCode) -> Self {
        KeyRef::Code(i64::from(value.as_u16()))
    }
}

impl From<&str> for KeyRef {
    fn from(value: &str) -> Self {
        KeyRef::Name(value.to_string())
    }
}

impl From<String> for KeyRef {
    fn from(value: String) -> Self {
        KeyRef::Name(value)
    }
}

impl std::fmt::Display for KeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRef::Code(code) => write!(f, "{code}"),
            KeyRef::Name(name) => f.write_str(name),
        }
    }
}

/// Which code space a `VK…` / `HID…` prefix selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSpace {
    Vk,
    Hid,
}

/// Unified key mapper providing all translation directions.
pub struct KeyMapper;

impl KeyMapper {
    /// Resolves a key to a Windows VK code.
    pub fn to_vk(key: &KeyRef) -> Option<u32> {
        match key {
            KeyRef::Code(code) => non_negative(*code),
            KeyRef::Name(text) => Self::text_to_vk(text),
        }
    }

    /// Resolves a key to a USB HID Usage ID.
    pub fn to_hid(key: &KeyRef) -> Option<u32> {
        match key {
            KeyRef::Code(code) => non_negative(*code),
            KeyRef::Name(text) => Self::text_to_hid(text),
        }
    }

    /// Produces the token the DHZ text protocol expects for a key.
    ///
    /// Numbers (raw or after prefix resolution) become their decimal string,
    /// single letters and digits become `KEY_<c>`, and every other name is
    /// returned in its normalised form (`"left shift"` → `"LEFT_SHIFT"`).
    pub fn to_symbolic_token(key: &KeyRef) -> Option<String> {
        let text = match key {
            KeyRef::Code(code) => return non_negative(*code).map(|c| c.to_string()),
            KeyRef::Name(text) => text,
        };
        let (space, body) = split_prefix(text);
        if body.is_empty() {
            return None;
        }
        match space {
            Some(CodeSpace::Vk) => return Self::text_to_vk(body).map(|c| c.to_string()),
            Some(CodeSpace::Hid) => return Self::text_to_hid(body).map(|c| c.to_string()),
            None => {}
        }
        if let Some(value) = parse_int_text(body) {
            return Some(value.to_string());
        }
        let token = names::normalize_name(body)?;
        if token.len() == 1 && token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Some(format!("KEY_{token}"));
        }
        Some(token)
    }

    /// Converts a VK code to the HID Usage ID for the same key.
    pub fn vk_to_hid(vk: u32) -> Option<u32> {
        let vk = u8::try_from(vk).ok()?;
        match windows_vk::vk_to_hid(vk) {
            HidKeyCode::Unknown => None,
            hid => Some(u32::from(hid.as_u16())),
        }
    }

    /// Converts a HID Usage ID to the VK code for the same key.
    pub fn hid_to_vk(hid: u32) -> Option<u32> {
        let hid = u16::try_from(hid).ok()?;
        windows_vk::hid_to_vk(HidKeyCode::from_u16(hid)).map(u32::from)
    }

    fn text_to_vk(text: &str) -> Option<u32> {
        let (space, body) = split_prefix(text);
        if body.is_empty() {
            return None;
        }
        if space == Some(CodeSpace::Hid) {
            return Self::text_to_hid(body).and_then(Self::hid_to_vk);
        }
        if let Some(value) = parse_int_text(body) {
            return non_negative(value);
        }
        let token = names::normalize_name(body)?;
        let token = names::alias(&token);
        names::vk_by_name(token)
            .or_else(|| names::hid_by_name(token).and_then(Self::hid_to_vk))
    }

    fn text_to_hid(text: &str) -> Option<u32> {
        let (space, body) = split_prefix(text);
        if body.is_empty() {
            return None;
        }
        if space == Some(CodeSpace::Vk) {
            return Self::text_to_vk(body).and_then(Self::vk_to_hid);
        }
        if let Some(value) = parse_int_text(body) {
            return non_negative(value);
        }
        let token = names::normalize_name(body)?;
        let token = names::hid_alias(names::alias(&token));
        names::hid_by_name(token)
            .or_else(|| names::vk_by_name(token).and_then(Self::vk_to_hid))
    }
}

fn non_negative(value: i64) -> Option<u32> {
    u32::try_from(value).ok()
}

/// Splits `VK…` / `HID…` prefixes followed by `:`, `_` or a space.
///
/// Returns the selected code space and the trimmed remainder, or `None` and
/// the trimmed input when no prefix is present.
fn split_prefix(raw: &str) -> (Option<CodeSpace>, &str) {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (space, prefix_len) = if upper.starts_with("HID") {
        (CodeSpace::Hid, 3)
    } else if upper.starts_with("VK") {
        (CodeSpace::Vk, 2)
    } else {
        return (None, trimmed);
    };

    let rest = &trimmed[prefix_len..];
    let after_ws = rest.trim_start();
    let body = if let Some(body) = after_ws.strip_prefix([':', '_']) {
        body
    } else if rest.starts_with(char::is_whitespace) && rest.contains(' ') {
        after_ws
    } else {
        return (None, trimmed);
    };

    let body = body.trim();
    if body.is_empty() {
        return (None, trimmed);
    }
    (Some(space), body)
}

/// Parses an integer literal with optional sign and `0x`/`0o`/`0b` radix
/// prefix.  Decimal literals with leading zeros are rejected, `_` digit
/// separators are accepted.
pub(crate) fn parse_int_text(text: &str) -> Option<i64> {
    let raw = text.trim();
    let (negative, unsigned) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let lower = unsigned.to_ascii_lowercase();
    let (radix, digits) = if let Some(d) = lower.strip_prefix("0x") {
        (16, d)
    } else if let Some(d) = lower.strip_prefix("0o") {
        (8, d)
    } else if let Some(d) = lower.strip_prefix("0b") {
        (2, d)
    } else {
        if lower.len() > 1 && lower.starts_with('0') && lower.bytes().any(|b| b != b'0' && b != b'_') {
            return None;
        }
        (10, lower.as_str())
    };
    let digits = digits.strip_prefix('_').unwrap_or(digits);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    let value = i64::from_str_radix(&cleaned, radix).ok()?;
    Some(if negative { -value } else { value })
}
