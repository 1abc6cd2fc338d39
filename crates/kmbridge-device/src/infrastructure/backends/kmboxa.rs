//! kmboxA USB box backend (vendor DLL).
//!
//! The box sits between the physical mouse and the PC, so the OS sees its
//! buttons as ordinary input: button state and the key-state fallback are
//! read from the OS async key table instead of a listener.

use std::sync::Arc;

use kmbridge_core::{parse_vid_pid, BackendKind, KeyMapper, KeyRef, MouseButton};
use tracing::{debug, error, info, warn};

use crate::application::backend::{Backend, DeviceError, StateReader};
use crate::application::settings::KmboxASettings;
use crate::infrastructure::native::{KmboxAApi, NativeLoader};
use crate::infrastructure::os_input::{InputInjector, OsKeyState};

pub struct KmboxABackend {
    api: Arc<dyn KmboxAApi>,
    key_state: Arc<KmboxAKeyState>,
    warned_keyboard: bool,
}

/// Module key state when available, else the OS async key table.
struct KmboxAKeyState {
    api: Arc<dyn KmboxAApi>,
    os: OsKeyState,
}

impl StateReader for KmboxAKeyState {
    fn is_key_pressed(&self, key: &KeyRef) -> bool {
        let hid = KeyMapper::to_hid(key).and_then(|code| u8::try_from(code).ok());
        if let Some(pressed) = hid.and_then(|hid| self.api.key_state(hid)) {
            return pressed;
        }
        self.os.is_key_pressed(key)
    }

    fn live_button_state(&self, button: MouseButton) -> Option<bool> {
        self.os.live_button_state(button)
    }
}

/// Parses the VID/PID, loads the module and runs `init`.
///
/// # Errors
///
/// - [`DeviceError::InvalidParameter`] for an unreadable VID/PID.
/// - Loader errors as returned.
/// - [`DeviceError::HandshakeFailed`] when init returns non-zero.
pub fn connect(
    settings: &KmboxASettings,
    loader: &dyn NativeLoader,
    os: Arc<dyn InputInjector>,
) -> Result<KmboxABackend, DeviceError> {
    let (vid, pid) = parse_vid_pid(&settings.vid_pid, (0, 0), true).map_err(|e| {
        let msg = format!("Invalid kmboxA VID/PID: {e}");
        error!("{msg}");
        DeviceError::InvalidParameter(msg)
    })?;

    let api = loader.load_kmboxa(&settings.library).map_err(|e| {
        error!("{e}");
        e
    })?;

    let ret = api.init(vid, pid);
    if ret != 0 {
        let msg = format!("kmboxA init failed (code={ret})");
        error!("{msg}");
        return Err(DeviceError::HandshakeFailed(msg));
    }
    info!("Connected to kmboxA (VID={vid}, PID={pid})");
    let key_state = Arc::new(KmboxAKeyState {
        api: Arc::clone(&api),
        os: OsKeyState::new(os),
    });
    Ok(KmboxABackend {
        api,
        key_state,
        warned_keyboard: false,
    })
}

impl KmboxABackend {
    fn hid(key: &KeyRef) -> Option<u8> {
        let hid = KeyMapper::to_hid(key).and_then(|code| u8::try_from(code).ok());
        if hid.is_none() {
            debug!("kmboxA: cannot resolve key {key}");
        }
        hid
    }

    fn keyboard_missing(&mut self) {
        if !self.warned_keyboard {
            self.warned_keyboard = true;
            warn!("kmboxA keyboard functions are not available in this module build.");
        }
    }
}

impl Backend for KmboxABackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KmboxA
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        let clamp = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        self.api.mouse_move(clamp(dx), clamp(dy));
        Ok(())
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        if self.api.button(button, pressed).is_none() {
            debug!("kmboxA module has no {button} button symbol");
        }
        Ok(())
    }

    fn wheel(&mut self, delta: i32) -> Result<(), DeviceError> {
        let delta = delta.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8;
        if self.api.wheel(delta).is_none() {
            debug!("kmboxA module has no wheel symbol");
        }
        Ok(())
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        if let Some(hid) = Self::hid(key) {
            if self.api.key_down(hid).is_none() {
                self.keyboard_missing();
            }
        }
        Ok(())
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        if let Some(hid) = Self::hid(key) {
            if self.api.key_up(hid).is_none() {
                self.keyboard_missing();
            }
        }
        Ok(())
    }

    /// Uses `KM_press` when present, else down then up.
    fn key_press(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(hid) = Self::hid(key) else {
            return Ok(());
        };
        if self.api.key_press(hid).is_some() {
            return Ok(());
        }
        let down = self.api.key_down(hid);
        let up = self.api.key_up(hid);
        if down.is_none() && up.is_none() {
            self.keyboard_missing();
        }
        Ok(())
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        Some(Arc::clone(&self.key_state) as Arc<dyn StateReader>)
    }

    fn disconnect(&mut self) {
        debug!("kmboxA released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::native::{MockKmboxAApi, MockNativeLoader};
    use crate::infrastructure::os_input::mock::MockInjector;
    use mockall::predicate::eq;

    fn settings(vid_pid: &str) -> KmboxASettings {
        KmboxASettings {
            vid_pid: vid_pid.to_string(),
            ..KmboxASettings::default()
        }
    }

    fn loader_for(api: MockKmboxAApi) -> MockNativeLoader {
        let api: Arc<dyn KmboxAApi> = Arc::new(api);
        let mut loader = MockNativeLoader::new();
        loader.expect_load_kmboxa().returning(move |_| Ok(Arc::clone(&api)));
        loader
    }

    #[test]
    fn test_init_receives_parsed_vid_pid() {
        // Arrange
        let mut api = MockKmboxAApi::new();
        api.expect_init().with(eq(0x1A86), eq(0x55D3)).times(1).return_const(0);

        // Act
        let result = connect(&settings("v1a8655d3"), &loader_for(api), Arc::new(MockInjector::new()));

        // Assert
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_vid_pid_is_invalid_parameter() {
        let mut loader = MockNativeLoader::new();
        loader.expect_load_kmboxa().never();
        let result = connect(&settings(""), &loader, Arc::new(MockInjector::new()));
        assert!(matches!(result, Err(DeviceError::InvalidParameter(_))));
    }

    #[test]
    fn test_non_zero_init_fails() {
        let mut api = MockKmboxAApi::new();
        api.expect_init().return_const(3);
        let result = connect(&settings("0x1A86/0x55D3"), &loader_for(api), Arc::new(MockInjector::new()));
        let err = result.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("kmboxA init failed (code=3)"));
    }

    #[test]
    fn test_key_press_falls_back_to_down_up() {
        // Arrange
        let mut api = MockKmboxAApi::new();
        api.expect_init().return_const(0);
        api.expect_key_press().return_const(None);
        api.expect_key_down().with(eq(4)).times(1).return_const(Some(0));
        api.expect_key_up().with(eq(4)).times(1).return_const(Some(0));
        let mut backend = connect(&settings("1A86 55D3"), &loader_for(api), Arc::new(MockInjector::new()))
            .ok()
            .unwrap();

        // Act / Assert
        backend.key_press(&KeyRef::from("a")).unwrap();
    }

    #[test]
    fn test_state_falls_back_to_os_table() {
        // Arrange
        let mut api = MockKmboxAApi::new();
        api.expect_init().return_const(0);
        api.expect_key_state().return_const(None);
        let os = Arc::new(MockInjector::new());
        os.hold(0x01);
        os.hold(0x41);
        let backend = connect(
            &settings("1A86 55D3"),
            &loader_for(api),
            Arc::clone(&os) as Arc<dyn InputInjector>,
        )
        .ok()
        .unwrap();

        // Act
        let reader = backend.state_reader().unwrap();

        // Assert
        assert_eq!(reader.live_button_state(MouseButton::Left), Some(true));
        assert_eq!(reader.live_button_state(MouseButton::Side1), Some(false));
        assert!(reader.is_key_pressed(&KeyRef::from("A")));
    }
}
