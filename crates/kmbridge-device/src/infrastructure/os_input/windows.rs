//! Windows input injection via the SendInput API.
//!
//! Mouse moves are relative (`MOUSEEVENTF_MOVE` without `ABSOLUTE`), so the
//! OS pointer acceleration settings apply exactly as for a physical mouse.
//! Each call sends one `INPUT` record.

#![cfg(target_os = "windows")]

use kmbridge_core::MouseButton;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT,
    KEYBD_EVENT_FLAGS, KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE,
    MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEEVENTF_XDOWN,
    MOUSEEVENTF_XUP, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{WHEEL_DELTA, XBUTTON1, XBUTTON2};

use super::{InjectError, InputInjector};

/// VKs that need `KEYEVENTF_EXTENDEDKEY`: navigation cluster, Insert/Delete,
/// Windows keys, right Ctrl/Alt.
const EXTENDED_VKS: [u8; 14] = [
    0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x2D, 0x2E, 0x5B, 0x5C, 0xA3, 0xA5,
];

/// [`InputInjector`] backed by `SendInput` and `GetAsyncKeyState`.
#[derive(Debug, Default)]
pub struct WindowsInjector;

impl WindowsInjector {
    pub fn new() -> Self {
        Self
    }
}

impl InputInjector for WindowsInjector {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectError> {
        send_mouse(dx, dy, 0, MOUSEEVENTF_MOVE)
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<(), InjectError> {
        let (flags, mouse_data) = match (button, pressed) {
            (MouseButton::Left, true) => (MOUSEEVENTF_LEFTDOWN, 0),
            (MouseButton::Left, false) => (MOUSEEVENTF_LEFTUP, 0),
            (MouseButton::Right, true) => (MOUSEEVENTF_RIGHTDOWN, 0),
            (MouseButton::Right, false) => (MOUSEEVENTF_RIGHTUP, 0),
            (MouseButton::Middle, true) => (MOUSEEVENTF_MIDDLEDOWN, 0),
            (MouseButton::Middle, false) => (MOUSEEVENTF_MIDDLEUP, 0),
            (MouseButton::Side1, true) => (MOUSEEVENTF_XDOWN, XBUTTON1 as u32),
            (MouseButton::Side1, false) => (MOUSEEVENTF_XUP, XBUTTON1 as u32),
            (MouseButton::Side2, true) => (MOUSEEVENTF_XDOWN, XBUTTON2 as u32),
            (MouseButton::Side2, false) => (MOUSEEVENTF_XUP, XBUTTON2 as u32),
        };
        send_mouse(0, 0, mouse_data, flags)
    }

    fn wheel(&self, delta: i32) -> Result<(), InjectError> {
        let amount = delta.saturating_mul(WHEEL_DELTA as i32);
        send_mouse(0, 0, amount as u32, MOUSEEVENTF_WHEEL)
    }

    fn key(&self, vk: u32, pressed: bool) -> Result<(), InjectError> {
        let vk = u8::try_from(vk).map_err(|_| InjectError::InvalidKeyCode(vk))?;
        let mut flags = KEYBD_EVENT_FLAGS(0);
        if !pressed {
            flags |= KEYEVENTF_KEYUP;
        }
        if EXTENDED_VKS.contains(&vk) {
            flags |= KEYEVENTF_EXTENDEDKEY;
        }
        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(u16::from(vk)),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        send(input)
    }

    fn is_vk_down(&self, vk: u32) -> bool {
        let Ok(vk) = i32::try_from(vk) else {
            return false;
        };
        // SAFETY: GetAsyncKeyState only reads input state; any VK value is accepted.
        let state = unsafe { GetAsyncKeyState(vk) };
        (state as u16) & 0x8000 != 0
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn send_mouse(dx: i32, dy: i32, mouse_data: u32, flags: MOUSE_EVENT_FLAGS) -> Result<(), InjectError> {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: mouse_data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    send(input)
}

fn send(input: INPUT) -> Result<(), InjectError> {
    // SAFETY: input is a fully initialised INPUT on the stack and cbsize is its size.
    let inserted = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if inserted == 1 {
        Ok(())
    } else {
        Err(InjectError::Platform(format!(
            "SendInput inserted {inserted} events: {}",
            std::io::Error::last_os_error()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_vk_is_rejected_before_sending() {
        let injector = WindowsInjector::new();
        assert!(matches!(
            injector.key(0x1_00, true),
            Err(InjectError::InvalidKeyCode(0x100))
        ));
    }

    #[test]
    fn test_out_of_range_vk_reads_as_released() {
        assert!(!WindowsInjector::new().is_vk_down(u32::MAX));
    }
}
