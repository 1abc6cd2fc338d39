//! MakV2 binary framing.
//!
//! Wire format:
//! ```text
//! [0x50][cmd:1][len_lo:1][len_hi:1][payload:len]
//! ```
//! The length is the payload size as a little-endian `u16`.  Multi-byte
//! payload fields are little-endian too.
//!
//! Only movement, the three primary buttons, button streaming and the version
//! query have binary codes.  Keys, side buttons and locks are sent as `km.`
//! text lines on the same port (see [`super::km_text`]).

use super::ProtocolError;

/// First byte of every frame.
pub const FRAME_MAGIC: u8 = 0x50;

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Command codes.
pub mod cmd {
    pub const MOVE: u8 = 0x0D;
    pub const MOVETO: u8 = 0x0E;
    pub const LEFT: u8 = 0x08;
    pub const RIGHT: u8 = 0x11;
    pub const MIDDLE: u8 = 0x12;
    pub const BUTTONS: u8 = 0x02;
    pub const VERSION: u8 = 0xBF;
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub payload: Vec<u8>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a frame.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds 65 535
/// bytes.
pub fn encode_frame(command: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(FRAME_MAGIC);
    buf.push(command);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the start of `bytes`.
///
/// Returns the frame and the number of bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the magic byte is wrong or the buffer is
/// shorter than the header or the declared payload.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }
    if bytes[0] != FRAME_MAGIC {
        return Err(ProtocolError::BadMagic(bytes[0]));
    }
    let declared = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let available = bytes.len() - FRAME_HEADER_SIZE;
    if available < declared {
        return Err(ProtocolError::PayloadLengthMismatch { declared, available });
    }
    let end = FRAME_HEADER_SIZE + declared;
    let frame = Frame {
        command: bytes[1],
        payload: bytes[FRAME_HEADER_SIZE..end].to_vec(),
    };
    Ok((frame, end))
}

/// `MOVE` frame with payload `i16 dx, i16 dy`.
///
/// Deltas outside the `i16` range are clamped.
pub fn move_frame(dx: i32, dy: i32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&clamp_i16(dx).to_le_bytes());
    payload.extend_from_slice(&clamp_i16(dy).to_le_bytes());
    frame_unchecked(cmd::MOVE, &payload)
}

/// `MOVE` frame with a Bézier control point:
/// `i16 dx, i16 dy, u8 segments, i8 ctrl_x, i8 ctrl_y`.
///
/// `segments` is clamped to 1..=255 and the control point to the `i8` range.
pub fn move_curved_frame(dx: i32, dy: i32, segments: u32, ctrl_x: i32, ctrl_y: i32) -> Vec<u8> {
    let segments = segments.clamp(1, u8::MAX as u32) as u8;
    let mut payload = Vec::with_capacity(7);
    payload.extend_from_slice(&clamp_i16(dx).to_le_bytes());
    payload.extend_from_slice(&clamp_i16(dy).to_le_bytes());
    payload.push(segments);
    payload.push(clamp_i8(ctrl_x) as u8);
    payload.push(clamp_i8(ctrl_y) as u8);
    frame_unchecked(cmd::MOVE, &payload)
}

/// Button frame for left (`0`), right (`1`) or middle (`2`).
///
/// Side buttons have no binary code and return `None`.
pub fn button_frame(index: usize, pressed: bool) -> Option<Vec<u8>> {
    let command = match index {
        0 => cmd::LEFT,
        1 => cmd::RIGHT,
        2 => cmd::MIDDLE,
        _ => return None,
    };
    Some(frame_unchecked(command, &[u8::from(pressed)]))
}

/// `BUTTONS` frame enabling or disabling pushed status bytes.
pub fn buttons_frame(enabled: bool) -> Vec<u8> {
    frame_unchecked(cmd::BUTTONS, &[u8::from(enabled)])
}

/// Zero-payload `VERSION` query: `50 BF 00 00`.
pub fn version_frame() -> Vec<u8> {
    frame_unchecked(cmd::VERSION, &[])
}

/// Returns `true` if the bytes received after a version query identify a
/// MakV2 binary device.
///
/// Accepts a binary reply (first byte `0xBF`) and, for firmware that answers
/// in text, a reply containing `MAKCU` or `km.`.  At least two bytes are
/// required.
pub fn is_version_response(resp: &[u8]) -> bool {
    if resp.len() < 2 {
        return false;
    }
    resp[0] == cmd::VERSION || contains(resp, b"MAKCU") || contains(resp, b"km.")
}

// ── Status stream ─────────────────────────────────────────────────────────────

/// Splits the pushed status stream into button masks.
///
/// The device sends either a bare status byte or `0x02` followed by the mask.
/// Line breaks and printable bytes (command echoes) are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusDecoder {
    awaiting_mask: bool,
}

impl StatusDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte and returns a complete button mask, if any.
    pub fn feed(&mut self, byte: u8) -> Option<u8> {
        if self.awaiting_mask {
            self.awaiting_mask = false;
            return Some(byte);
        }
        match byte {
            cmd::BUTTONS => {
                self.awaiting_mask = true;
                None
            }
            0x0A | 0x0D => None,
            b if b > 31 => None,
            b => Some(b),
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn frame_unchecked(command: u8, payload: &[u8]) -> Vec<u8> {
    // Every fixed-size payload above is far below the u16 length limit.
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(FRAME_MAGIC);
    buf.push(command);
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn clamp_i8(v: i32) -> i8 {
    v.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
