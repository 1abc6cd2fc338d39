//! Dynamic loading of the vendor DLLs with `LoadLibraryW` / `GetProcAddress`.

#![cfg(target_os = "windows")]

use std::ffi::{c_char, CString};

use kmbridge_core::MouseButton;
use tracing::{debug, info};
use windows::core::{HSTRING, PCSTR};
use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use super::{KmNetApi, KmboxAApi, ModuleFeatures};
use crate::application::backend::DeviceError;

// ── Library handle ────────────────────────────────────────────────────────────

struct Library {
    name: String,
    handle: HMODULE,
}

// SAFETY: an HMODULE is a process-wide handle; it stays valid until
// FreeLibrary in Drop and may be used from any thread.
unsafe impl Send for Library {}
// SAFETY: see above; the handle itself is never mutated after load.
unsafe impl Sync for Library {}

impl Library {
    fn open(path: &str) -> Result<Self, DeviceError> {
        // SAFETY: the path is a valid, NUL-terminated wide string owned by HSTRING.
        let handle = unsafe { LoadLibraryW(&HSTRING::from(path)) }
            .map_err(|e| DeviceError::NativeModuleLoadFailed(format!("cannot load {path}: {e}")))?;
        Ok(Self {
            name: path.to_string(),
            handle,
        })
    }

    /// Resolves `symbol` as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the
    /// exported symbol's real signature.
    unsafe fn symbol<F: Copy>(&self, symbol: &str) -> Option<F> {
        let name = CString::new(symbol).ok()?;
        let proc = GetProcAddress(self.handle, PCSTR::from_raw(name.as_ptr().cast()))?;
        Some(std::mem::transmute_copy(&proc))
    }

    unsafe fn required<F: Copy>(&self, symbol: &str) -> Result<F, DeviceError> {
        self.symbol(symbol).ok_or_else(|| {
            DeviceError::NativeModuleLoadFailed(format!("{symbol} not found in {}", self.name))
        })
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // SAFETY: the handle came from LoadLibraryW and is freed exactly once.
        if let Err(e) = unsafe { FreeLibrary(self.handle) } {
            debug!("FreeLibrary({}) failed: {e}", self.name);
        }
    }
}

/// Per-button optional symbols, indexed like [`MouseButton::ALL`].
type ButtonFns<F> = [Option<F>; 5];

// ── kmNet ─────────────────────────────────────────────────────────────────────

type NetInit = unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> i32;
type NetMove = unsafe extern "C" fn(i16, i16) -> i32;
type NetInt = unsafe extern "C" fn(i32) -> i32;
type NetShort = unsafe extern "C" fn(i16) -> i32;
type NetQuery = unsafe extern "C" fn() -> i32;

pub struct KmNetModule {
    init: NetInit,
    mouse_move: NetMove,
    buttons: ButtonFns<NetInt>,
    wheel: Option<NetInt>,
    monitor: Option<NetShort>,
    button_state: ButtonFns<NetQuery>,
    key_down: Option<NetInt>,
    key_up: Option<NetInt>,
    key_state: Option<NetShort>,
    mask_key: Option<NetShort>,
    unmask_key: Option<NetShort>,
    unmask_all: Option<NetQuery>,
    features: ModuleFeatures,
    // Declared last so the pointers above are never used after FreeLibrary.
    _library: Library,
}

impl KmNetModule {
    pub fn load(path: &str) -> Result<Self, DeviceError> {
        let library = Library::open(path)?;
        // SAFETY: every type below matches the vendor header for that symbol.
        let module = unsafe {
            let buttons = MouseButton::ALL.map(|b| library.symbol::<NetInt>(&format!("kmNet_mouse_{}", b.name())));
            let button_state =
                MouseButton::ALL.map(|b| library.symbol::<NetQuery>(&format!("kmNet_monitor_mouse_{}", b.name())));
            Self {
                init: library.required("kmNet_init")?,
                mouse_move: library.required("kmNet_mouse_move")?,
                buttons: [
                    Some(library.required::<NetInt>("kmNet_mouse_left")?),
                    buttons[1],
                    buttons[2],
                    buttons[3],
                    buttons[4],
                ],
                wheel: library.symbol("kmNet_mouse_wheel"),
                monitor: library.symbol("kmNet_monitor"),
                button_state,
                key_down: library.symbol("kmNet_keydown"),
                key_up: library.symbol("kmNet_keyup"),
                key_state: library.symbol("kmNet_monitor_keyboard"),
                mask_key: library.symbol("kmNet_mask_keyboard"),
                unmask_key: library.symbol("kmNet_unmask_keyboard"),
                unmask_all: library.symbol("kmNet_unmask_all"),
                features: ModuleFeatures::default(),
                _library: library,
            }
        };
        let features = ModuleFeatures {
            extra_buttons: module.buttons[1..].iter().all(Option::is_some),
            wheel: module.wheel.is_some(),
            monitor: module.monitor.is_some(),
            button_state: module.button_state.iter().any(Option::is_some),
            keyboard: module.key_down.is_some() && module.key_up.is_some(),
            key_state: module.key_state.is_some(),
            key_mask: module.mask_key.is_some() && module.unmask_key.is_some(),
        };
        info!("Loaded kmNet module {path}: {features:?}");
        Ok(Self { features, ..module })
    }
}

impl KmNetApi for KmNetModule {
    fn features(&self) -> ModuleFeatures {
        self.features
    }

    fn init(&self, ip: &str, port: &str, uuid: &str) -> i32 {
        let (Ok(ip), Ok(port), Ok(uuid)) = (CString::new(ip), CString::new(port), CString::new(uuid)) else {
            return -1;
        };
        // SAFETY: the three pointers are NUL-terminated and outlive the call.
        unsafe { (self.init)(ip.as_ptr(), port.as_ptr(), uuid.as_ptr()) }
    }

    fn mouse_move(&self, dx: i16, dy: i16) -> i32 {
        // SAFETY: resolved from the loaded module with this signature.
        unsafe { (self.mouse_move)(dx, dy) }
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Option<i32> {
        let f = self.buttons[button.index()]?;
        // SAFETY: as above.
        Some(unsafe { f(i32::from(pressed)) })
    }

    fn wheel(&self, delta: i32) -> Option<i32> {
        // SAFETY: as above.
        self.wheel.map(|f| unsafe { f(delta) })
    }

    fn monitor(&self, port: i16) -> Option<i32> {
        // SAFETY: as above.
        self.monitor.map(|f| unsafe { f(port) })
    }

    fn button_state(&self, button: MouseButton) -> Option<bool> {
        let f = self.button_state[button.index()]?;
        // SAFETY: as above.
        Some(unsafe { f() } != 0)
    }

    fn key_down(&self, code: i32) -> Option<i32> {
        // SAFETY: as above.
        self.key_down.map(|f| unsafe { f(code) })
    }

    fn key_up(&self, code: i32) -> Option<i32> {
        // SAFETY: as above.
        self.key_up.map(|f| unsafe { f(code) })
    }

    fn key_state(&self, code: i16) -> Option<bool> {
        // SAFETY: as above.
        self.key_state.map(|f| unsafe { f(code) } != 0)
    }

    fn mask_key(&self, code: i16) -> Option<i32> {
        // SAFETY: as above.
        self.mask_key.map(|f| unsafe { f(code) })
    }

    fn unmask_key(&self, code: i16) -> Option<i32> {
        // SAFETY: as above.
        self.unmask_key.map(|f| unsafe { f(code) })
    }

    fn unmask_all(&self) -> Option<i32> {
        // SAFETY: as above.
        self.unmask_all.map(|f| unsafe { f() })
    }
}

// ── kmboxA ────────────────────────────────────────────────────────────────────

type BoxInit = unsafe extern "C" fn(u16, u16) -> i32;
type BoxMove = unsafe extern "C" fn(i16, i16) -> i32;
type BoxByte = unsafe extern "C" fn(u8) -> i32;
type BoxWheel = unsafe extern "C" fn(i8) -> i32;

pub struct KmboxAModule {
    init: BoxInit,
    mouse_move: BoxMove,
    buttons: ButtonFns<BoxByte>,
    wheel: Option<BoxWheel>,
    key_down: Option<BoxByte>,
    key_up: Option<BoxByte>,
    key_press: Option<BoxByte>,
    key_state: Option<BoxByte>,
    features: ModuleFeatures,
    _library: Library,
}

impl KmboxAModule {
    pub fn load(path: &str) -> Result<Self, DeviceError> {
        let library = Library::open(path)?;
        // SAFETY: every type below matches the vendor header for that symbol.
        let module = unsafe {
            let buttons = MouseButton::ALL.map(|b| library.symbol::<BoxByte>(&format!("KM_{}", b.name())));
            Self {
                init: library.required("KM_init")?,
                mouse_move: library.required("KM_move")?,
                buttons: [
                    Some(library.required::<BoxByte>("KM_left")?),
                    buttons[1],
                    buttons[2],
                    buttons[3],
                    buttons[4],
                ],
                wheel: library.symbol("KM_wheel"),
                key_down: library.symbol("KM_down"),
                key_up: library.symbol("KM_up"),
                key_press: library.symbol("KM_press"),
                key_state: library.symbol("KM_isdown"),
                features: ModuleFeatures::default(),
                _library: library,
            }
        };
        let features = ModuleFeatures {
            extra_buttons: module.buttons[1..].iter().all(Option::is_some),
            wheel: module.wheel.is_some(),
            monitor: false,
            button_state: false,
            keyboard: module.key_down.is_some() && module.key_up.is_some(),
            key_state: module.key_state.is_some(),
            key_mask: false,
        };
        info!("Loaded kmboxA module {path}: {features:?}");
        Ok(Self { features, ..module })
    }
}

impl KmboxAApi for KmboxAModule {
    fn features(&self) -> ModuleFeatures {
        self.features
    }

    fn init(&self, vid: u16, pid: u16) -> i32 {
        // SAFETY: resolved from the loaded module with this signature.
        unsafe { (self.init)(vid, pid) }
    }

    fn mouse_move(&self, dx: i16, dy: i16) -> i32 {
        // SAFETY: as above.
        unsafe { (self.mouse_move)(dx, dy) }
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Option<i32> {
        let f = self.buttons[button.index()]?;
        // SAFETY: as above.
        Some(unsafe { f(u8::from(pressed)) })
    }

    fn wheel(&self, delta: i8) -> Option<i32> {
        // SAFETY: as above.
        self.wheel.map(|f| unsafe { f(delta) })
    }

    fn key_down(&self, hid: u8) -> Option<i32> {
        // SAFETY: as above.
        self.key_down.map(|f| unsafe { f(hid) })
    }

    fn key_up(&self, hid: u8) -> Option<i32> {
        // SAFETY: as above.
        self.key_up.map(|f| unsafe { f(hid) })
    }

    fn key_press(&self, hid: u8) -> Option<i32> {
        // SAFETY: as above.
        self.key_press.map(|f| unsafe { f(hid) })
    }

    fn key_state(&self, hid: u8) -> Option<bool> {
        // SAFETY: as above.
        self.key_state.map(|f| unsafe { f(hid) } != 0)
    }
}
