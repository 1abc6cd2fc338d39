//! Vendor native modules (kmNet, kmboxA).
//!
//! Both vendors ship a Windows DLL.  The loader resolves a fixed symbol table
//! once at load time: required symbols must be present or the load fails,
//! optional ones are recorded in a [`ModuleFeatures`] set and the matching
//! API method returns `None` when the symbol is missing.
//!
//! # Symbol table
//!
//! | Module | Required                                  | Optional                                            |
//! |--------|-------------------------------------------|-----------------------------------------------------|
//! | kmNet  | `kmNet_init`, `kmNet_mouse_move`, `kmNet_mouse_left` | right/middle/side buttons, wheel, monitor, `kmNet_monitor_mouse_*`, keydown/keyup, `kmNet_monitor_keyboard`, mask/unmask |
//! | kmboxA | `KM_init`, `KM_move`, `KM_left`           | right/middle/side buttons, wheel, down/up/press, `KM_isdown` |

pub mod isolation;

#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;

use kmbridge_core::MouseButton;

use crate::application::backend::DeviceError;

/// Optional capabilities a loaded module exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleFeatures {
    /// Right, middle and side buttons.
    pub extra_buttons: bool,
    pub wheel: bool,
    pub monitor: bool,
    /// Per-button state queries.
    pub button_state: bool,
    pub keyboard: bool,
    pub key_state: bool,
    pub key_mask: bool,
}

/// Calls into a loaded kmNet module.
///
/// `Option` results are `None` when the module lacks that symbol.
#[cfg_attr(test, mockall::automock)]
pub trait KmNetApi: Send + Sync {
    fn features(&self) -> ModuleFeatures;

    fn init(&self, ip: &str, port: &str, uuid: &str) -> i32;

    fn mouse_move(&self, dx: i16, dy: i16) -> i32;

    fn button(&self, button: MouseButton, pressed: bool) -> Option<i32>;

    fn wheel(&self, delta: i32) -> Option<i32>;

    /// Starts (`port > 0`) or stops (`0`) the module's state monitor.
    fn monitor(&self, port: i16) -> Option<i32>;

    fn button_state(&self, button: MouseButton) -> Option<bool>;

    fn key_down(&self, code: i32) -> Option<i32>;

    fn key_up(&self, code: i32) -> Option<i32>;

    fn key_state(&self, code: i16) -> Option<bool>;

    fn mask_key(&self, code: i16) -> Option<i32>;

    fn unmask_key(&self, code: i16) -> Option<i32>;

    fn unmask_all(&self) -> Option<i32>;
}

/// Calls into a loaded kmboxA module.
#[cfg_attr(test, mockall::automock)]
pub trait KmboxAApi: Send + Sync {
    fn features(&self) -> ModuleFeatures;

    fn init(&self, vid: u16, pid: u16) -> i32;

    fn mouse_move(&self, dx: i16, dy: i16) -> i32;

    fn button(&self, button: MouseButton, pressed: bool) -> Option<i32>;

    fn wheel(&self, delta: i8) -> Option<i32>;

    fn key_down(&self, hid: u8) -> Option<i32>;

    fn key_up(&self, hid: u8) -> Option<i32>;

    fn key_press(&self, hid: u8) -> Option<i32>;

    fn key_state(&self, hid: u8) -> Option<bool>;
}

/// Loads vendor modules by library path.
#[cfg_attr(test, mockall::automock)]
pub trait NativeLoader: Send + Sync {
    /// # Errors
    ///
    /// [`DeviceError::NativeModuleLoadFailed`] when the library or a required
    /// symbol is missing, [`DeviceError::Unsupported`] off Windows.
    fn load_kmnet(&self, library: &str) -> Result<Arc<dyn KmNetApi>, DeviceError>;

    /// # Errors
    ///
    /// Same as [`NativeLoader::load_kmnet`].
    fn load_kmboxa(&self, library: &str) -> Result<Arc<dyn KmboxAApi>, DeviceError>;
}

/// Loader for the running platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl NativeLoader for SystemLoader {
    #[cfg(target_os = "windows")]
    fn load_kmnet(&self, library: &str) -> Result<Arc<dyn KmNetApi>, DeviceError> {
        Ok(Arc::new(windows::KmNetModule::load(library)?))
    }

    #[cfg(not(target_os = "windows"))]
    fn load_kmnet(&self, library: &str) -> Result<Arc<dyn KmNetApi>, DeviceError> {
        Err(unsupported(library))
    }

    #[cfg(target_os = "windows")]
    fn load_kmboxa(&self, library: &str) -> Result<Arc<dyn KmboxAApi>, DeviceError> {
        Ok(Arc::new(windows::KmboxAModule::load(library)?))
    }

    #[cfg(not(target_os = "windows"))]
    fn load_kmboxa(&self, library: &str) -> Result<Arc<dyn KmboxAApi>, DeviceError> {
        Err(unsupported(library))
    }
}

#[cfg(not(target_os = "windows"))]
fn unsupported(library: &str) -> DeviceError {
    DeviceError::Unsupported(format!(
        "native module {library} can only be loaded on Windows x86-64"
    ))
}
