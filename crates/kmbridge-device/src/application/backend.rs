//! The backend contract every device driver implements.
//!
//! A backend owns one transport resource (serial port, UDP socket, loaded
//! vendor module or the OS input queue) and turns the facade's calls into
//! wire commands.  Backends are created by a [`BackendFactory`] once per
//! successful connect and dropped on disconnect or switch.
//!
//! # Shared input state (for beginners)
//!
//! Button and key state is written by a background listener thread and read
//! by callers on other threads.  Both sides share one [`SharedInputState`]
//! through an `Arc`.  The facade owns the `Arc` and hands a clone to each
//! backend it connects, so clearing it on switch is visible immediately,
//! before the old listener has even been joined.

use std::sync::Arc;

use kmbridge_core::{
    Axis, BackendKind, ButtonStateTable, ButtonTransition, KeyRef, KeyStateCache, MouseButton,
};
use parking_lot::Mutex;
use thiserror::Error;

use super::settings::BackendSettings;

/// Errors from connecting to or talking to a device.
///
/// Connect-path variants carry the user-facing message that is also stored
/// as the connection status' `last_error`.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{0}")]
    PortNotFound(String),
    #[error("{0}")]
    HandshakeFailed(String),
    #[error("{0}")]
    Timeout(String),
    #[error("transport closed: {0}")]
    TransportClosed(String),
    #[error("{0}")]
    NativeModuleLoadFailed(String),
    #[error("{0}")]
    InvalidParameter(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One connected device driver.
///
/// Output methods are fire-and-forget: a failed write is returned to the
/// facade, which logs it and moves on.  Nothing is retried.
///
/// Default implementations cover what most backends lack: curved moves fall
/// back to straight moves, clicks become down + up, and keyboard, wheel,
/// lock and mask calls do nothing.
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError>;

    fn move_curved(
        &mut self,
        dx: i32,
        dy: i32,
        _segments: u32,
        _ctrl_x: i32,
        _ctrl_y: i32,
    ) -> Result<(), DeviceError> {
        self.move_relative(dx, dy)
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError>;

    fn click(&mut self, button: MouseButton) -> Result<(), DeviceError> {
        self.button(button, true)?;
        self.button(button, false)
    }

    fn wheel(&mut self, _delta: i32) -> Result<(), DeviceError> {
        Ok(())
    }

    fn key_down(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        Ok(())
    }

    fn key_up(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        Ok(())
    }

    fn key_press(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        self.key_down(key)?;
        self.key_up(key)
    }

    /// Handle for key and live button queries, taken once at connect.
    ///
    /// `None` means keys read as released and buttons come from the shared
    /// table.
    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        None
    }

    fn lock_button(&mut self, _button: MouseButton, _locked: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn lock_axis(&mut self, _axis: Axis, _locked: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn mask_key(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        Ok(())
    }

    fn unmask_key(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        Ok(())
    }

    fn unmask_all_keys(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Raises the link to 4 Mbaud.  Only MAKCU firmware supports it.
    fn switch_to_4m(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(format!(
            "{} does not support baud switching",
            self.kind()
        )))
    }

    /// Stops the listener and releases the transport.  Idempotent.
    fn disconnect(&mut self);
}

/// State queries answered without the backend lock.
///
/// The facade keeps a clone of this handle next to the backend, so a slow
/// query (a device round trip, a reply wait) never holds up output calls.
pub trait StateReader: Send + Sync {
    /// Current state of a keyboard key, `false` when unknown.
    fn is_key_pressed(&self, key: &KeyRef) -> bool;

    /// Button state read straight from the OS instead of the listener table.
    ///
    /// Only backends without a device-side button stream return `Some`.
    fn live_button_state(&self, _button: MouseButton) -> Option<bool> {
        None
    }
}

/// Creates connected backends.
///
/// The production factory probes real hardware; tests substitute one that
/// returns scripted fakes.
pub trait BackendFactory: Send + Sync {
    /// Probes and connects a backend of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] describing why no device could be reached.
    fn connect(
        &self,
        kind: BackendKind,
        settings: &BackendSettings,
        state: Arc<SharedInputState>,
    ) -> Result<Box<dyn Backend>, DeviceError>;
}

/// Button table and key cache shared between listener and callers.
#[derive(Debug, Default)]
pub struct SharedInputState {
    buttons: Mutex<ButtonStateTable>,
    keys: Mutex<KeyStateCache>,
}

impl SharedInputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a pushed five-button status byte.
    pub fn apply_mask(&self, mask: u8) -> Vec<ButtonTransition> {
        self.buttons.lock().apply_mask(mask)
    }

    pub fn set_button(&self, button: MouseButton, pressed: bool) {
        self.buttons.lock().set(button, pressed);
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.buttons.lock().is_pressed(button)
    }

    pub fn last_mask(&self) -> u8 {
        self.buttons.lock().last_mask()
    }

    pub fn set_key(&self, code: u32, pressed: bool) {
        self.keys.lock().set(code, pressed);
    }

    pub fn key(&self, code: u32) -> Option<bool> {
        self.keys.lock().get(code)
    }

    /// Clears every button and key.
    pub fn reset(&self) {
        self.buttons.lock().reset();
        self.keys.lock().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_state_reset_clears_buttons_and_keys() {
        // Arrange
        let state = SharedInputState::new();
        state.apply_mask(0b00011);
        state.set_key(4, true);

        // Act
        state.reset();

        // Assert
        assert!(!state.is_button_pressed(MouseButton::Left));
        assert!(!state.is_button_pressed(MouseButton::Right));
        assert_eq!(state.last_mask(), 0);
        assert_eq!(state.key(4), None);
    }

    #[test]
    fn test_apply_mask_reports_only_changed_buttons() {
        // Arrange
        let state = SharedInputState::new();

        // Act
        let first = state.apply_mask(0b00011);
        let repeat = state.apply_mask(0b00011);

        // Assert
        assert_eq!(first.len(), 2);
        assert!(repeat.is_empty());
    }

    #[test]
    fn test_error_messages_are_user_facing() {
        let err = DeviceError::PortNotFound("No supported serial devices found.".to_string());
        assert_eq!(err.to_string(), "No supported serial devices found.");
    }
}
