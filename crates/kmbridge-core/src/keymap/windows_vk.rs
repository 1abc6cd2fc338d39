//! Windows Virtual Key (VK) code ↔ USB HID Usage ID table.
//!
//! kmNet and the SendInput backend take VK codes, the serial firmwares take
//! HID codes.  Whenever a caller names a key in one space and the backend
//! speaks the other, the conversion goes through this table.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h) and USB HID Usage Tables 1.3.
//!
//! # How the table works
//!
//! `VK_TO_HID_TABLE` is a compile-time array of 256 [`HidKeyCode`] values
//! indexed by VK code.  Slots without a keyboard equivalent (mouse-button VKs,
//! the generic `VK_SHIFT`/`VK_CONTROL`/`VK_MENU`, browser keys) hold
//! `HidKeyCode::Unknown`.

use super::hid::HidKeyCode;

/// Translates a VK code to a HID Usage ID.
///
/// Returns [`HidKeyCode::Unknown`] when the VK has no keyboard equivalent.
pub fn vk_to_hid(vk: u8) -> HidKeyCode {
    VK_TO_HID_TABLE[vk as usize]
}

/// Translates a HID Usage ID to a VK code.
///
/// Returns `None` for `Unknown` and for HID codes no VK maps to.
pub fn hid_to_vk(hid: HidKeyCode) -> Option<u8> {
    if hid == HidKeyCode::Unknown {
        return None;
    }
    VK_TO_HID_TABLE
        .iter()
        .position(|&mapped| mapped == hid)
        .map(|vk| vk as u8)
}

/// VK → HID mapping indexed by VK code (0x00–0xFF).
///
/// Reference: https://learn.microsoft.com/windows/win32/inputdev/virtual-key-codes
const VK_TO_HID_TABLE: [HidKeyCode; 256] = {
    use HidKeyCode::*;
    let mut t = [Unknown; 256];

    // ── Editing keys ──────────────────────────────────────────────────────────
    t[0x08] = Backspace;    // VK_BACK
    t[0x09] = Tab;          // VK_TAB
    t[0x0D] = Enter;        // VK_RETURN
    t[0x13] = Pause;        // VK_PAUSE
    t[0x14] = CapsLock;     // VK_CAPITAL
    t[0x1B] = Escape;       // VK_ESCAPE
    t[0x20] = Space;        // VK_SPACE

    // ── Navigation ────────────────────────────────────────────────────────────
    t[0x21] = PageUp;       // VK_PRIOR
    t[0x22] = PageDown;     // VK_NEXT
    t[0x23] = End;
    t[0x24] = Home;
    t[0x25] = ArrowLeft;
    t[0x26] = ArrowUp;
    t[0x27] = ArrowRight;
    t[0x28] = ArrowDown;
    t[0x2C] = PrintScreen;  // VK_SNAPSHOT
    t[0x2D] = Insert;
    t[0x2E] = Delete;

    // ── Digit row (VK '0'..'9') ───────────────────────────────────────────────
    t[0x30] = Digit0;
    let digits = [Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9];
    let mut i = 0;
    while i < digits.len() {
        t[0x31 + i] = digits[i];
        i += 1;
    }

    // ── Letters (VK 'A'..'Z') ─────────────────────────────────────────────────
    let letters = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
        KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];
    let mut i = 0;
    while i < letters.len() {
        t[0x41 + i] = letters[i];
        i += 1;
    }

    t[0x5B] = MetaLeft;     // VK_LWIN
    t[0x5C] = MetaRight;    // VK_RWIN
    t[0x5D] = ContextMenu;  // VK_APPS

    // ── Keypad ────────────────────────────────────────────────────────────────
    let numpad = [
        Numpad0, Numpad1, Numpad2, Numpad3, Numpad4, Numpad5, Numpad6, Numpad7, Numpad8, Numpad9,
    ];
    let mut i = 0;
    while i < numpad.len() {
        t[0x60 + i] = numpad[i];
        i += 1;
    }
    t[0x6A] = NumpadMultiply;
    t[0x6B] = NumpadAdd;
    t[0x6D] = NumpadSubtract;
    t[0x6E] = NumpadDecimal;
    t[0x6F] = NumpadDivide;
    t[0x90] = NumLock;
    t[0x91] = ScrollLock;

    // ── Function keys (VK_F1=0x70 … VK_F24=0x87) ──────────────────────────────
    let function = [
        F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
        F13, F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24,
    ];
    let mut i = 0;
    while i < function.len() {
        t[0x70 + i] = function[i];
        i += 1;
    }

    // ── Sided modifiers ───────────────────────────────────────────────────────
    t[0xA0] = ShiftLeft;
    t[0xA1] = ShiftRight;
    t[0xA2] = ControlLeft;
    t[0xA3] = ControlRight;
    t[0xA4] = AltLeft;      // VK_LMENU
    t[0xA5] = AltRight;     // VK_RMENU

    // ── OEM punctuation (US layout) ───────────────────────────────────────────
    t[0xBA] = Semicolon;    // VK_OEM_1
    t[0xBB] = Equal;        // VK_OEM_PLUS
    t[0xBC] = Comma;
    t[0xBD] = Minus;
    t[0xBE] = Period;
    t[0xBF] = Slash;        // VK_OEM_2
    t[0xC0] = Backquote;    // VK_OEM_3
    t[0xDB] = BracketLeft;  // VK_OEM_4
    t[0xDC] = Backslash;    // VK_OEM_5
    t[0xDD] = BracketRight; // VK_OEM_6
    t[0xDE] = Quote;        // VK_OEM_7

    t
};
