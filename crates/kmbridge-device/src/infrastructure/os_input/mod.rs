//! OS synthetic input.
//!
//! Used directly by the SendInput backend, and by the kmboxA backend for
//! reading live button and key state.  The real implementation exists only
//! on Windows; elsewhere [`system_injector`] reports `Unsupported`.

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;

use kmbridge_core::{KeyMapper, KeyRef, MouseButton};
use thiserror::Error;

use crate::application::backend::{DeviceError, StateReader};

/// Errors from the OS input queue.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("invalid virtual-key code: {0}")]
    InvalidKeyCode(u32),

    #[error("platform error: {0}")]
    Platform(String),
}

impl From<InjectError> for DeviceError {
    fn from(err: InjectError) -> Self {
        match err {
            InjectError::InvalidKeyCode(_) => DeviceError::InvalidParameter(err.to_string()),
            InjectError::Platform(msg) => DeviceError::Io(std::io::Error::other(msg)),
        }
    }
}

/// Injects relative mouse and keyboard events and reads async key state.
pub trait InputInjector: Send + Sync {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectError>;

    fn button(&self, button: MouseButton, pressed: bool) -> Result<(), InjectError>;

    /// Vertical wheel; `delta` is in wheel clicks.
    fn wheel(&self, delta: i32) -> Result<(), InjectError>;

    fn key(&self, vk: u32, pressed: bool) -> Result<(), InjectError>;

    /// `true` while the OS reports `vk` as held down.
    fn is_vk_down(&self, vk: u32) -> bool;
}

/// Virtual-key code of a mouse button (`VK_LBUTTON` … `VK_XBUTTON2`).
pub fn button_vk(button: MouseButton) -> u32 {
    match button {
        MouseButton::Left => 0x01,
        MouseButton::Right => 0x02,
        MouseButton::Middle => 0x04,
        MouseButton::Side1 => 0x05,
        MouseButton::Side2 => 0x06,
    }
}

/// Key and button state read from the OS async key table.
pub struct OsKeyState {
    os: Arc<dyn InputInjector>,
}

impl OsKeyState {
    pub fn new(os: Arc<dyn InputInjector>) -> Self {
        Self { os }
    }

    pub fn is_vk_down(&self, vk: u32) -> bool {
        self.os.is_vk_down(vk)
    }
}

impl StateReader for OsKeyState {
    fn is_key_pressed(&self, key: &KeyRef) -> bool {
        KeyMapper::to_vk(key).is_some_and(|vk| self.os.is_vk_down(vk))
    }

    fn live_button_state(&self, button: MouseButton) -> Option<bool> {
        Some(self.os.is_vk_down(button_vk(button)))
    }
}

/// The OS injector for the running platform.
///
/// # Errors
///
/// Returns [`DeviceError::Unsupported`] on platforms without `SendInput`.
pub fn system_injector() -> Result<Arc<dyn InputInjector>, DeviceError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsInjector::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(DeviceError::Unsupported(
            "SendInput is only available on Windows".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_vks_match_windows_constants() {
        let vks: Vec<u32> = MouseButton::ALL.iter().map(|b| button_vk(*b)).collect();
        assert_eq!(vks, vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn test_inject_errors_map_to_device_errors() {
        let err: DeviceError = InjectError::InvalidKeyCode(300).into();
        assert!(matches!(err, DeviceError::InvalidParameter(_)));
        let err: DeviceError = InjectError::Platform("queue blocked".into()).into();
        assert_eq!(err.to_string(), "I/O error: queue blocked");
    }

    #[test]
    fn test_os_key_state_reads_held_vks() {
        // Arrange
        let injector = Arc::new(mock::MockInjector::new());
        injector.hold(0x02);
        injector.hold(0x41);

        // Act
        let reader = OsKeyState::new(injector);

        // Assert
        assert_eq!(reader.live_button_state(MouseButton::Right), Some(true));
        assert_eq!(reader.live_button_state(MouseButton::Left), Some(false));
        assert!(reader.is_key_pressed(&KeyRef::from("A")));
        assert!(!reader.is_key_pressed(&KeyRef::from("B")));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_system_injector_is_unsupported_off_windows() {
        assert!(matches!(system_injector(), Err(DeviceError::Unsupported(_))));
    }
}
