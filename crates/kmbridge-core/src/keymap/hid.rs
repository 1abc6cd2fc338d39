//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! Device firmware that emulates a keyboard (MAKCU, MakV2, Ferrum, kmboxA)
//! expects key arguments as HID Usage IDs, so this is the code space most
//! backends speak on the wire.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # HID codes versus VK codes (for beginners)
//!
//! A HID Usage ID names a *physical key position*, while a Windows virtual-key
//! code names a *logical key*.  The two spaces overlap but use different
//! numbers:
//!
//! | Key          | HID Usage ID | Windows VK |
//! |--------------|--------------|------------|
//! | Letter A     | 0x04         | 0x41       |
//! | Enter        | 0x28         | 0x0D       |
//! | F13          | 0x68         | 0x7C       |
//! | Left Ctrl    | 0xE0         | 0xA2       |
//!
//! [`HidKeyCode::Unknown`] (0x0000) marks a code that has no known variant.

use serde::{Deserialize, Serialize};

/// USB HID Usage ID for keyboard keys (page 0x07).
///
/// The discriminant of each variant is its Usage ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum HidKeyCode {
    // Letters (HID 0x04–0x1D)
    KeyA = 0x04,
    KeyB = 0x05,
    KeyC = 0x06,
    KeyD = 0x07,
    KeyE = 0x08,
    KeyF = 0x09,
    KeyG = 0x0A,
    KeyH = 0x0B,
    KeyI = 0x0C,
    KeyJ = 0x0D,
    KeyK = 0x0E,
    KeyL = 0x0F,
    KeyM = 0x10,
    KeyN = 0x11,
    KeyO = 0x12,
    KeyP = 0x13,
    KeyQ = 0x14,
    KeyR = 0x15,
    KeyS = 0x16,
    KeyT = 0x17,
    KeyU = 0x18,
    KeyV = 0x19,
    KeyW = 0x1A,
    KeyX = 0x1B,
    KeyY = 0x1C,
    KeyZ = 0x1D,

    // Digit row (HID 0x1E–0x27, 1 first and 0 last)
    Digit1 = 0x1E,
    Digit2 = 0x1F,
    Digit3 = 0x20,
    Digit4 = 0x21,
    Digit5 = 0x22,
    Digit6 = 0x23,
    Digit7 = 0x24,
    Digit8 = 0x25,
    Digit9 = 0x26,
    Digit0 = 0x27,

    // Editing and punctuation (HID 0x28–0x39)
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    BracketLeft = 0x2F,
    BracketRight = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    Backquote = 0x35,
    Comma = 0x36,
    Period = 0x37,
    Slash = 0x38,
    CapsLock = 0x39,

    // F1–F12 (HID 0x3A–0x45)
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation cluster (HID 0x46–0x52)
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,

    // Keypad (HID 0x53–0x63)
    NumLock = 0x53,
    NumpadDivide = 0x54,
    NumpadMultiply = 0x55,
    NumpadSubtract = 0x56,
    NumpadAdd = 0x57,
    NumpadEnter = 0x58,
    Numpad1 = 0x59,
    Numpad2 = 0x5A,
    Numpad3 = 0x5B,
    Numpad4 = 0x5C,
    Numpad5 = 0x5D,
    Numpad6 = 0x5E,
    Numpad7 = 0x5F,
    Numpad8 = 0x60,
    Numpad9 = 0x61,
    Numpad0 = 0x62,
    NumpadDecimal = 0x63,

    ContextMenu = 0x65,

    // F13–F24 (HID 0x68–0x73)
    F13 = 0x68,
    F14 = 0x69,
    F15 = 0x6A,
    F16 = 0x6B,
    F17 = 0x6C,
    F18 = 0x6D,
    F19 = 0x6E,
    F20 = 0x6F,
    F21 = 0x70,
    F22 = 0x71,
    F23 = 0x72,
    F24 = 0x73,

    // Modifiers (HID 0xE0–0xE7)
    ControlLeft = 0xE0,
    ShiftLeft = 0xE1,
    AltLeft = 0xE2,
    MetaLeft = 0xE3,
    ControlRight = 0xE4,
    ShiftRight = 0xE5,
    AltRight = 0xE6,
    MetaRight = 0xE7,

    /// Sentinel for codes with no known variant.
    Unknown = 0x0000,
}

impl HidKeyCode {
    /// Every assigned variant, in Usage ID order.  `Unknown` is excluded.
    pub const ALL: [HidKeyCode; 116] = {
        use HidKeyCode::*;
        [
            KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
            KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
            Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9, Digit0,
            Enter, Escape, Backspace, Tab, Space, Minus, Equal, BracketLeft, BracketRight,
            Backslash, Semicolon, Quote, Backquote, Comma, Period, Slash, CapsLock,
            F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
            PrintScreen, ScrollLock, Pause, Insert, Home, PageUp, Delete, End, PageDown,
            ArrowRight, ArrowLeft, ArrowDown, ArrowUp,
            NumLock, NumpadDivide, NumpadMultiply, NumpadSubtract, NumpadAdd, NumpadEnter,
            Numpad1, Numpad2, Numpad3, Numpad4, Numpad5, Numpad6, Numpad7, Numpad8,
            Numpad9, Numpad0, NumpadDecimal, ContextMenu,
            F13, F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24,
            ControlLeft, ShiftLeft, AltLeft, MetaLeft,
            ControlRight, ShiftRight, AltRight, MetaRight,
        ]
    };

    /// Looks up the variant for a raw Usage ID.
    ///
    /// Returns [`HidKeyCode::Unknown`] for unassigned values.
    pub fn from_u16(value: u16) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_u16() == value)
            .unwrap_or(HidKeyCode::Unknown)
    }

    /// Returns the raw USB HID Usage ID.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u16_finds_every_assigned_variant() {
        for code in HidKeyCode::ALL {
            // Arrange
            let raw = code.as_u16();

            // Act
            let found = HidKeyCode::from_u16(raw);

            // Assert
            assert_eq!(found, code, "from_u16(0x{raw:04X}) should produce {code:?}");
        }
    }

    #[test]
    fn test_all_table_is_sorted_and_has_no_duplicates() {
        let raws: Vec<u16> = HidKeyCode::ALL.iter().map(|c| c.as_u16()).collect();
        for pair in raws.windows(2) {
            assert!(pair[0] < pair[1], "0x{:02X} must sort before 0x{:02X}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_unassigned_values_return_unknown() {
        for unassigned in [0x00u16, 0x01, 0x03, 0x32, 0x64, 0x74, 0xA0, 0xFF, 0x1234] {
            assert_eq!(
                HidKeyCode::from_u16(unassigned),
                HidKeyCode::Unknown,
                "0x{unassigned:02X} should map to Unknown"
            );
        }
    }

    #[test]
    fn test_letters_are_contiguous_from_0x04() {
        // Arrange
        let letters = &HidKeyCode::ALL[..26];

        // Act / Assert
        for (i, letter) in letters.iter().enumerate() {
            assert_eq!(letter.as_u16(), 0x04 + i as u16);
        }
        assert_eq!(letters[25], HidKeyCode::KeyZ);
    }

    #[test]
    fn test_extended_function_keys_start_at_0x68() {
        assert_eq!(HidKeyCode::F13.as_u16(), 104);
        assert_eq!(HidKeyCode::F24.as_u16(), 115);
    }
}
