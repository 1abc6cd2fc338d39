//! kmboxA USB VID/PID text parsing.
//!
//! Users copy VID/PID pairs from vendor tools, device manager and forum posts,
//! so many spellings have to be accepted:
//!
//! | Input            | Result             |
//! |------------------|--------------------|
//! | `0x1A86/0x55D3`  | (0x1A86, 0x55D3)   |
//! | `6688 2021`      | (0x6688, 0x2021)   |
//! | `66882021`       | (0x6688, 0x2021)   |
//! | `v1a8655d3`      | (0x1A86, 0x55D3)   |
//! | `d:1234/h:ff`    | (1234, 0x00FF)     |
//! | `0x1A8655D3`     | (0x1A86, 0x55D3)   |
//!
//! A four-digit all-numeric token is read as hex because kmboxA tooling
//! prints IDs as bare four-character hex blocks.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VidPidError {
    #[error("VID/PID is empty")]
    Empty,

    #[error("invalid VID/PID format: {0}")]
    InvalidFormat(String),
}

const SEPARATORS: [char; 6] = ['/', ':', ',', ';', '|', ' '];

/// Parses a VID/PID string.
///
/// In lenient mode (`strict == false`) unreadable parts fall back to the
/// matching entry of `defaults`.  In strict mode they are errors.
pub fn parse_vid_pid(text: &str, defaults: (u16, u16), strict: bool) -> Result<(u16, u16), VidPidError> {
    let raw = text.trim();
    let v_prefixed = raw.starts_with(['v', 'V']);
    let body = if v_prefixed { raw[1..].trim() } else { raw };

    if body.is_empty() {
        return if strict { Err(VidPidError::Empty) } else { Ok(defaults) };
    }

    let invalid = || VidPidError::InvalidFormat(raw.to_string());

    if v_prefixed && (5..=8).contains(&body.len()) && body.bytes().all(|b| b.is_ascii_hexdigit()) {
        let vid = u16::from_str_radix(&body[..4], 16).map_err(|_| invalid())?;
        let pid = u16::from_str_radix(&body[4..], 16).map_err(|_| invalid())?;
        return Ok((vid, pid));
    }

    let pick = |token: &str, fallback: u16| -> Result<u16, VidPidError> {
        match parse_token(token) {
            Some(value) => Ok(value),
            None if strict => Err(invalid()),
            None => Ok(fallback),
        }
    };

    for sep in SEPARATORS {
        if !body.contains(sep) {
            continue;
        }
        let parts: Vec<&str> = body.split(sep).filter(|p| !p.trim().is_empty()).collect();
        if parts.len() >= 2 {
            return Ok((pick(parts[0], defaults.0)?, pick(parts[1], defaults.1)?));
        }
    }

    if body.len() == 8 && body.bytes().all(|b| b.is_ascii_digit()) {
        return Ok((pick(&body[..4], defaults.0)?, pick(&body[4..], defaults.1)?));
    }

    match parse_token_wide(body) {
        Some(packed) if packed > 0xFFFF => Ok(((packed >> 16) as u16, (packed & 0xFFFF) as u16)),
        Some(value) => Ok((value as u16, defaults.1)),
        None if strict => Err(invalid()),
        None => Ok(defaults),
    }
}

/// Formats a pair so that [`parse_vid_pid`] reads it back unchanged.
pub fn format_vid_pid(vid: u16, pid: u16) -> String {
    format!("0x{vid:04X}/0x{pid:04X}")
}

fn parse_token(token: &str) -> Option<u16> {
    parse_token_wide(token).and_then(|v| u16::try_from(v).ok())
}

fn parse_token_wide(token: &str) -> Option<u32> {
    let mut token = token.trim();
    if token.starts_with(['v', 'V']) {
        token = token[1..].trim();
    }
    let lower = token.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("d:") {
        return rest.trim().parse().ok();
    }
    if let Some(rest) = lower.strip_prefix("h:") {
        return u32::from_str_radix(rest.trim(), 16).ok();
    }
    if let Some(rest) = lower.strip_prefix("0x") {
        return u32::from_str_radix(rest, 16).ok();
    }
    if lower.len() == 4 && lower.bytes().all(|b| b.is_ascii_digit()) {
        return u32::from_str_radix(&lower, 16).ok();
    }
    if lower.bytes().any(|b| (b'a'..=b'f').contains(&b)) {
        return u32::from_str_radix(&lower, 16).ok();
    }
    lower.parse().ok()
}
