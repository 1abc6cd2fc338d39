//! The `km.` text protocol spoken by MAKCU and MakV2 firmware.
//!
//! Every command is one ASCII line:
//! ```text
//! km.<name>(<arg>,<arg>,…)\r
//! ```
//! The firmware echoes each command back and, once `km.buttons(1)` has been
//! sent, interleaves single status bytes (bit `i` = button `i`) into the same
//! stream.  Splitting that stream is the listener's job; this module only
//! deals with the commands themselves.

use std::fmt;

use crate::domain::axis_lock::Axis;
use crate::domain::buttons::MouseButton;

use super::{parse_arg, split_call, ProtocolError};

/// Prefix of every command.
pub const KM_PREFIX: &str = "km.";

/// Line terminator the firmware waits for.
pub const TERMINATOR: u8 = b'\r';

/// Marker the MAKCU firmware includes in its `km.version()` reply.
pub const MAKCU_MARKER: &str = "MAKCU";

/// Raw frame that tells MAKCU firmware at 115 200 baud to switch to 4 Mbaud.
pub const BAUD_CHANGE_4M: [u8; 9] = [0xDE, 0xAD, 0x05, 0x00, 0xA5, 0x00, 0x09, 0x3D, 0x00];

/// One text command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmCommand {
    Move { dx: i32, dy: i32 },
    MoveCurved { dx: i32, dy: i32, segments: u32, ctrl_x: i32, ctrl_y: i32 },
    Button { button: MouseButton, pressed: bool },
    Wheel(i32),
    KeyDown(u32),
    KeyUp(u32),
    KeyPress(u32),
    LockButton { button: MouseButton, locked: bool },
    LockAxis { axis: Axis, locked: bool },
    /// Enables or disables pushed button status bytes.
    Buttons(bool),
    Version,
}

impl KmCommand {
    /// Encodes the command as the bytes written to the port.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.push(TERMINATOR);
        bytes
    }

    /// Parses one command line, with or without the `km.` prefix and `\r`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedCommand`] for unknown names or bad
    /// arguments.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let text = line.trim();
        let body = text.strip_prefix(KM_PREFIX).unwrap_or(text);
        let (name, args) = split_call(body)?;
        let malformed = || ProtocolError::MalformedCommand(text.to_string());
        let flag = |arg: &str| -> Result<bool, ProtocolError> {
            match arg {
                "1" => Ok(true),
                "0" => Ok(false),
                _ => Err(malformed()),
            }
        };

        let command = match (name, args.as_slice()) {
            ("move", [dx, dy]) => KmCommand::Move {
                dx: parse_arg(text, dx)?,
                dy: parse_arg(text, dy)?,
            },
            ("move", [dx, dy, seg, cx, cy]) => KmCommand::MoveCurved {
                dx: parse_arg(text, dx)?,
                dy: parse_arg(text, dy)?,
                segments: parse_arg(text, seg)?,
                ctrl_x: parse_arg(text, cx)?,
                ctrl_y: parse_arg(text, cy)?,
            },
            ("wheel", [delta]) => KmCommand::Wheel(parse_arg(text, delta)?),
            ("down", [key]) => KmCommand::KeyDown(parse_arg(text, key)?),
            ("up", [key]) => KmCommand::KeyUp(parse_arg(text, key)?),
            ("press", [key]) => KmCommand::KeyPress(parse_arg(text, key)?),
            ("lock_mx", [v]) => KmCommand::LockAxis { axis: Axis::X, locked: flag(v)? },
            ("lock_my", [v]) => KmCommand::LockAxis { axis: Axis::Y, locked: flag(v)? },
            ("buttons", [v]) => KmCommand::Buttons(flag(v)?),
            ("version", []) => KmCommand::Version,
            (other, [v]) => {
                if let Some(button) = MouseButton::ALL.into_iter().find(|b| b.name() == other) {
                    KmCommand::Button { button, pressed: flag(v)? }
                } else if let Some(button) =
                    MouseButton::ALL.into_iter().find(|b| lock_name(*b) == other)
                {
                    KmCommand::LockButton { button, locked: flag(v)? }
                } else {
                    return Err(malformed());
                }
            }
            _ => return Err(malformed()),
        };
        Ok(command)
    }
}

/// Firmware name of the lock command for `button`.
pub fn lock_name(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "lock_ml",
        MouseButton::Right => "lock_mr",
        MouseButton::Middle => "lock_mm",
        MouseButton::Side1 => "lock_ms1",
        MouseButton::Side2 => "lock_ms2",
    }
}

/// Firmware name of the lock command for `axis`.
pub fn axis_lock_name(axis: Axis) -> &'static str {
    match axis {
        Axis::X => "lock_mx",
        Axis::Y => "lock_my",
    }
}

impl fmt::Display for KmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| u8::from(b);
        match *self {
            KmCommand::Move { dx, dy } => write!(f, "{KM_PREFIX}move({dx},{dy})"),
            KmCommand::MoveCurved { dx, dy, segments, ctrl_x, ctrl_y } => {
                write!(f, "{KM_PREFIX}move({dx},{dy},{segments},{ctrl_x},{ctrl_y})")
            }
            KmCommand::Button { button, pressed } => {
                write!(f, "{KM_PREFIX}{}({})", button.name(), flag(pressed))
            }
            KmCommand::Wheel(delta) => write!(f, "{KM_PREFIX}wheel({delta})"),
            KmCommand::KeyDown(key) => write!(f, "{KM_PREFIX}down({key})"),
            KmCommand::KeyUp(key) => write!(f, "{KM_PREFIX}up({key})"),
            KmCommand::KeyPress(key) => write!(f, "{KM_PREFIX}press({key})"),
            KmCommand::LockButton { button, locked } => {
                write!(f, "{KM_PREFIX}{}({})", lock_name(button), flag(locked))
            }
            KmCommand::LockAxis { axis, locked } => {
                write!(f, "{KM_PREFIX}{}({})", axis_lock_name(axis), flag(locked))
            }
            KmCommand::Buttons(on) => write!(f, "{KM_PREFIX}buttons({})", flag(on)),
            KmCommand::Version => write!(f, "{KM_PREFIX}version()"),
        }
    }
}

/// Returns `true` if a `km.version()` reply identifies MAKCU firmware.
pub fn is_makcu_version_reply(reply: &[u8]) -> bool {
    String::from_utf8_lossy(reply).contains(MAKCU_MARKER)
}

/// Returns `true` if a reply looks like any MAK-family firmware.
///
/// MakV2 boards answer with a variety of banners, so the check is loose:
/// `MAK`, `V2` or `KM.` anywhere in the upper-cased reply.
pub fn is_makv2_version_reply(reply: &[u8]) -> bool {
    let upper = String::from_utf8_lossy(reply).to_ascii_uppercase();
    ["MAK", "V2", "KM."].iter().any(|marker| upper.contains(marker))
}

/// Classifies one byte of the pushed stream.
///
/// Control bytes other than line breaks are button masks; everything else
/// belongs to command echoes and replies.
pub fn status_byte(byte: u8) -> Option<u8> {
    (byte < 32 && !matches!(byte, 0x0A | 0x0D)).then_some(byte)
}
