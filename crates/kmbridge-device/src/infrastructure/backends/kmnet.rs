//! kmNet network box backend (vendor DLL).
//!
//! Connect loads the module, runs `init` once in an isolated child process,
//! then calls it again in-process.  When the module exposes per-button
//! monitor queries, the listener polls them every 30 ms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::{BackendKind, KeyMapper, KeyRef, MouseButton};
use tracing::{debug, error, info, warn};

use crate::application::backend::{Backend, DeviceError, SharedInputState, StateReader};
use crate::application::settings::KmNetSettings;
use crate::infrastructure::listener::{ListenerHandle, ListenerStep};
use crate::infrastructure::native::isolation::InitIsolation;
use crate::infrastructure::native::{KmNetApi, NativeLoader};

/// Local port the module's monitor stream is started on.
pub const MONITOR_PORT: i16 = 30_000;

pub const POLL_INTERVAL: Duration = Duration::from_millis(30);

pub struct KmNetBackend {
    api: Arc<dyn KmNetApi>,
    key_state: Arc<KmNetKeyState>,
    listener: Option<ListenerHandle>,
    warned_keyboard: AtomicBool,
    connected: bool,
}

/// Loads, probes and initialises the kmNet module.
///
/// # Errors
///
/// - [`DeviceError::NativeModuleLoadFailed`] / [`DeviceError::Unsupported`]
///   from the loader.
/// - [`DeviceError::Timeout`] when the isolated init hangs.
/// - [`DeviceError::HandshakeFailed`] when init returns non-zero.
pub fn connect(
    settings: &KmNetSettings,
    loader: &dyn NativeLoader,
    isolation: &dyn InitIsolation,
    state: Arc<SharedInputState>,
) -> Result<KmNetBackend, DeviceError> {
    let api = loader.load_kmnet(&settings.library).map_err(|e| {
        error!("{e}");
        e
    })?;

    isolation
        .probe_kmnet(&settings.library, &settings.ip, &settings.port, &settings.uuid)
        .map_err(|e| {
            error!("{e}");
            e
        })?;

    let ret = api.init(&settings.ip, &settings.port, &settings.uuid);
    if ret != 0 {
        let msg = format!("kmNet.init failed (code={ret})");
        error!("{msg}");
        return Err(DeviceError::HandshakeFailed(msg));
    }

    if settings.monitor {
        match api.monitor(MONITOR_PORT) {
            Some(code) if code != 0 => warn!("kmNet.monitor failed (code={code})"),
            None => debug!("kmNet module has no monitor symbol"),
            _ => {}
        }
    }

    let listener = if api.features().button_state {
        let poller = Arc::clone(&api);
        let poll_state = Arc::clone(&state);
        Some(ListenerHandle::spawn("kmnet", state, move || {
            for button in MouseButton::ALL {
                if let Some(pressed) = poller.button_state(button) {
                    poll_state.set_button(button, pressed);
                }
            }
            std::thread::sleep(POLL_INTERVAL);
            ListenerStep::Continue
        })?)
    } else {
        state.reset();
        None
    };

    info!(
        "Connected to kmNet at {}:{} (UUID: {})",
        settings.ip, settings.port, settings.uuid
    );
    Ok(KmNetBackend {
        key_state: Arc::new(KmNetKeyState { api: Arc::clone(&api) }),
        api,
        listener,
        warned_keyboard: AtomicBool::new(false),
        connected: true,
    })
}

impl KmNetBackend {
    /// VK code for `key`, else its HID code.
    fn code(key: &KeyRef) -> Option<u32> {
        let code = KeyMapper::to_vk(key).or_else(|| KeyMapper::to_hid(key));
        if code.is_none() {
            debug!("kmNet: cannot resolve key {key}");
        }
        code
    }

    fn keyboard_missing(&self) {
        if !self.warned_keyboard.swap(true, Ordering::Relaxed) {
            warn!("kmNet keyboard functions are not available in this module build.");
        }
    }

    fn short(code: u32) -> Option<i16> {
        i16::try_from(code).ok()
    }

    /// Key code as the module's `int` argument.
    fn wide(code: u32) -> Result<i32, DeviceError> {
        i32::try_from(code)
            .map_err(|_| DeviceError::InvalidParameter(format!("kmNet key code {code} is out of range")))
    }
}

/// Module key-state queries, tried with the VK code first, then the HID code.
struct KmNetKeyState {
    api: Arc<dyn KmNetApi>,
}

impl StateReader for KmNetKeyState {
    fn is_key_pressed(&self, key: &KeyRef) -> bool {
        let mut codes = vec![KeyMapper::to_vk(key), KeyMapper::to_hid(key)];
        codes.dedup();
        codes
            .into_iter()
            .flatten()
            .filter_map(KmNetBackend::short)
            .find_map(|code| self.api.key_state(code))
            .unwrap_or(false)
    }
}

impl Backend for KmNetBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Net
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        let clamp = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        self.api.mouse_move(clamp(dx), clamp(dy));
        Ok(())
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        if self.api.button(button, pressed).is_none() {
            debug!("kmNet module has no {button} button symbol");
        }
        Ok(())
    }

    fn wheel(&mut self, delta: i32) -> Result<(), DeviceError> {
        if self.api.wheel(delta).is_none() {
            debug!("kmNet module has no wheel symbol");
        }
        Ok(())
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(code) = Self::code(key) else {
            return Ok(());
        };
        if self.api.key_down(Self::wide(code)?).is_none() {
            self.keyboard_missing();
        }
        Ok(())
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(code) = Self::code(key) else {
            return Ok(());
        };
        if self.api.key_up(Self::wide(code)?).is_none() {
            self.keyboard_missing();
        }
        Ok(())
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        Some(Arc::clone(&self.key_state) as Arc<dyn StateReader>)
    }

    fn mask_key(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(code) = Self::code(key).and_then(Self::short) else {
            return Ok(());
        };
        if self.api.mask_key(code).is_none() {
            self.keyboard_missing();
        }
        Ok(())
    }

    fn unmask_key(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(code) = Self::code(key).and_then(Self::short) else {
            return Ok(());
        };
        if self.api.unmask_key(code).is_none() {
            self.keyboard_missing();
        }
        Ok(())
    }

    fn unmask_all_keys(&mut self) -> Result<(), DeviceError> {
        if self.api.unmask_all().is_none() {
            self.keyboard_missing();
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if !std::mem::take(&mut self.connected) {
            return;
        }
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
        self.api.monitor(0);
        info!("kmNet disconnected");
    }
}

impl Drop for KmNetBackend {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::native::isolation::MockInitIsolation;
    use crate::infrastructure::native::{MockKmNetApi, MockNativeLoader, ModuleFeatures};
    use mockall::predicate::eq;

    fn loader_for(api: MockKmNetApi) -> MockNativeLoader {
        let api: Arc<dyn KmNetApi> = Arc::new(api);
        let mut loader = MockNativeLoader::new();
        loader.expect_load_kmnet().returning(move |_| Ok(Arc::clone(&api)));
        loader
    }

    fn passing_probe() -> MockInitIsolation {
        let mut probe = MockInitIsolation::new();
        probe.expect_probe_kmnet().returning(|_, _, _, _| Ok(()));
        probe
    }

    fn basic_api(features: ModuleFeatures) -> MockKmNetApi {
        let mut api = MockKmNetApi::new();
        api.expect_features().return_const(features);
        api.expect_init().return_const(0);
        api.expect_monitor().return_const(Some(0));
        api
    }

    #[test]
    fn test_probe_timeout_stops_before_in_process_init() {
        // Arrange
        let mut api = MockKmNetApi::new();
        api.expect_init().never();
        let loader = loader_for(api);
        let mut probe = MockInitIsolation::new();
        probe
            .expect_probe_kmnet()
            .returning(|_, _, _, _| Err(DeviceError::Timeout("kmNet.init timeout (3.0s)".into())));

        // Act
        let result = connect(
            &KmNetSettings::default(),
            &loader,
            &probe,
            Arc::new(SharedInputState::new()),
        );

        // Assert
        let err = result.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("kmNet.init timeout (3.0s)"));
    }

    #[test]
    fn test_non_zero_init_is_handshake_failure() {
        let mut api = MockKmNetApi::new();
        api.expect_init().return_const(-2);
        let result = connect(
            &KmNetSettings::default(),
            &loader_for(api),
            &passing_probe(),
            Arc::new(SharedInputState::new()),
        );
        let err = result.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("kmNet.init failed (code=-2)"));
    }

    #[test]
    fn test_connect_starts_monitor_and_disconnect_stops_it() {
        // Arrange
        let mut api = MockKmNetApi::new();
        api.expect_features().return_const(ModuleFeatures::default());
        api.expect_init().return_const(0);
        api.expect_monitor().with(eq(MONITOR_PORT)).times(1).return_const(Some(0));
        api.expect_monitor().with(eq(0)).times(1).return_const(Some(0));

        // Act
        let mut backend = connect(
            &KmNetSettings::default(),
            &loader_for(api),
            &passing_probe(),
            Arc::new(SharedInputState::new()),
        )
        .ok()
        .unwrap();
        backend.disconnect();
        backend.disconnect();

        // Assert: mock expectations verified on drop
    }

    #[test]
    fn test_listener_polls_module_button_state() {
        // Arrange
        let mut api = basic_api(ModuleFeatures {
            button_state: true,
            ..ModuleFeatures::default()
        });
        api.expect_button_state()
            .returning(|button| Some(button == MouseButton::Middle));
        let state = Arc::new(SharedInputState::new());

        // Act
        let mut backend = connect(&KmNetSettings::default(), &loader_for(api), &passing_probe(), Arc::clone(&state))
            .ok()
            .unwrap();
        for _ in 0..100 {
            if state.is_button_pressed(MouseButton::Middle) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        // Assert
        assert!(state.is_button_pressed(MouseButton::Middle));
        assert!(!state.is_button_pressed(MouseButton::Left));
        backend.disconnect();
        assert!(!state.is_button_pressed(MouseButton::Middle));
    }

    #[test]
    fn test_keys_use_vk_codes() {
        // Arrange
        let mut api = basic_api(ModuleFeatures::default());
        api.expect_key_down().with(eq(0x41)).times(1).return_const(Some(0));
        api.expect_key_state().with(eq(0x41)).times(1).return_const(Some(true));
        let mut backend = connect(
            &KmNetSettings::default(),
            &loader_for(api),
            &passing_probe(),
            Arc::new(SharedInputState::new()),
        )
        .ok()
        .unwrap();

        // Act
        backend.key_down(&KeyRef::from("A")).unwrap();
        let pressed = backend.state_reader().unwrap().is_key_pressed(&KeyRef::from("A"));

        // Assert
        assert!(pressed);
        backend.disconnect();
    }

    #[test]
    fn test_out_of_range_key_code_is_rejected() {
        // Arrange
        let mut api = basic_api(ModuleFeatures::default());
        api.expect_key_down().never();
        api.expect_key_up().never();
        let mut backend = connect(
            &KmNetSettings::default(),
            &loader_for(api),
            &passing_probe(),
            Arc::new(SharedInputState::new()),
        )
        .ok()
        .unwrap();
        let huge = KeyRef::from(0x8000_0000_i64);

        // Act
        let down = backend.key_down(&huge);
        let up = backend.key_up(&huge);

        // Assert
        assert!(matches!(down, Err(DeviceError::InvalidParameter(_))));
        assert!(matches!(up, Err(DeviceError::InvalidParameter(_))));
        backend.disconnect();
    }

    #[test]
    fn test_missing_keyboard_symbols_are_not_errors() {
        let mut api = basic_api(ModuleFeatures::default());
        api.expect_key_down().return_const(None);
        api.expect_unmask_all().return_const(None);
        let mut backend = connect(
            &KmNetSettings::default(),
            &loader_for(api),
            &passing_probe(),
            Arc::new(SharedInputState::new()),
        )
        .ok()
        .unwrap();

        assert!(backend.key_down(&KeyRef::from("A")).is_ok());
        assert!(backend.unmask_all_keys().is_ok());
        backend.disconnect();
    }
}
