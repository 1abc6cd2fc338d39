//! DeviceManager: the one facade callers use to drive a mouse and keyboard.
//!
//! The manager owns at most one connected [`Backend`] plus the shared input
//! state, the axis lock machine and both button mask machines.  Everything is
//! behind short-held `parking_lot` locks so aim loops, UI threads and the
//! periodic ticker can all call in concurrently.
//!
//! State queries never take the backend lock.  Button state comes from the
//! shared table (or the backend's live OS source) and key state from the
//! backend's [`StateReader`], whose handle is cloned out before the query
//! runs.  A key query waiting on a device reply therefore cannot delay a
//! move issued on another thread.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! connect(kind) ──► factory probes ──► Ok  ──► backend stored, status.connected = true
//!                                   └► Err ──► status.last_error set, state cleared
//!
//! switch_backend(kind) ──► status.connected = false, state cleared   (visible at once)
//!                      ──► old backend disconnected (listener joined)
//!                      ──► connect(kind)
//! ```
//!
//! Movement, button and key calls made while nothing is connected are silent
//! no-ops.  Output failures are logged and dropped; nothing is retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use kmbridge_core::{
    AxisCommand, AxisLockConfig, AxisLockManager, BackendKind, ButtonMaskConfig, ButtonMaskSet,
    CapabilitySet, Channel, KeyRef, MaskAction, MouseButton, SingleSlotMask,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::backend::{Backend, BackendFactory, DeviceError, SharedInputState, StateReader};
use super::settings::BackendSettings;

/// Which backend is selected and whether it is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub backend: BackendKind,
    pub connected: bool,
    /// Message of the most recent failed connect, empty after a success.
    pub last_error: String,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            backend: BackendKind::Serial,
            connected: false,
            last_error: String::new(),
        }
    }
}

/// Unified device-control facade.
pub struct DeviceManager {
    factory: Arc<dyn BackendFactory>,
    settings: RwLock<BackendSettings>,
    backend: Mutex<Option<Box<dyn Backend>>>,
    /// Query handle of the active backend.
    reader: RwLock<Option<Arc<dyn StateReader>>>,
    status: RwLock<ConnectionStatus>,
    state: Arc<SharedInputState>,
    axis_lock: Mutex<AxisLockManager>,
    lock_config: RwLock<AxisLockConfig>,
    single_mask: Mutex<SingleSlotMask>,
    mask_set: Mutex<ButtonMaskSet>,
    mask_config: RwLock<ButtonMaskConfig>,
    /// Serializes connect, switch and disconnect against each other.
    switching: Mutex<()>,
    send_warned: AtomicBool,
}

impl DeviceManager {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self::with_settings(factory, BackendSettings::default())
    }

    pub fn with_settings(factory: Arc<dyn BackendFactory>, settings: BackendSettings) -> Self {
        Self {
            factory,
            settings: RwLock::new(settings),
            backend: Mutex::new(None),
            reader: RwLock::new(None),
            status: RwLock::new(ConnectionStatus::default()),
            state: Arc::new(SharedInputState::new()),
            axis_lock: Mutex::new(AxisLockManager::new()),
            lock_config: RwLock::new(AxisLockConfig::default()),
            single_mask: Mutex::new(SingleSlotMask::new()),
            mask_set: Mutex::new(ButtonMaskSet::new()),
            mask_config: RwLock::new(ButtonMaskConfig::default()),
            switching: Mutex::new(()),
            send_warned: AtomicBool::new(false),
        }
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Tears down any active backend, then probes and connects `kind`.
    ///
    /// # Errors
    ///
    /// Returns the factory's [`DeviceError`]; its message is also stored as
    /// the status' `last_error`.
    pub fn connect(&self, kind: BackendKind, settings: &BackendSettings) -> Result<(), DeviceError> {
        let _guard = self.switching.lock();
        self.teardown();
        self.connect_locked(kind, settings)
    }

    /// Marks `kind` disconnected, disconnects the current backend, then
    /// connects `kind`.
    ///
    /// Button and key queries return `false` from the moment this is called.
    ///
    /// # Errors
    ///
    /// As [`DeviceManager::connect`].
    pub fn switch_backend(&self, kind: BackendKind, settings: &BackendSettings) -> Result<(), DeviceError> {
        {
            let mut status = self.status.write();
            status.backend = kind;
            status.connected = false;
        }
        self.state.reset();

        let _guard = self.switching.lock();
        info!("Switching backend to {kind}");
        self.teardown();
        self.connect_locked(kind, settings)
    }

    /// Disconnects the active backend, if any.
    pub fn disconnect_all(&self) {
        let _guard = self.switching.lock();
        self.teardown();
        self.status.write().connected = false;
    }

    fn connect_locked(&self, kind: BackendKind, settings: &BackendSettings) -> Result<(), DeviceError> {
        *self.settings.write() = settings.clone();
        {
            let mut status = self.status.write();
            status.backend = kind;
            status.connected = false;
        }

        match self.factory.connect(kind, settings, Arc::clone(&self.state)) {
            Ok(backend) => {
                *self.reader.write() = backend.state_reader();
                *self.backend.lock() = Some(backend);
                self.send_warned.store(false, Ordering::Relaxed);
                let mut status = self.status.write();
                status.connected = true;
                status.last_error.clear();
                info!("{kind} backend connected");
                Ok(())
            }
            Err(e) => {
                warn!("{kind} connect failed: {e}");
                self.state.reset();
                let mut status = self.status.write();
                status.connected = false;
                status.last_error = e.to_string();
                Err(e)
            }
        }
    }

    /// Clears state, disconnects and drops the backend and forgets masks.
    fn teardown(&self) {
        self.state.reset();
        self.reader.write().take();
        let previous = self.backend.lock().take();
        if let Some(mut backend) = previous {
            let kind = backend.kind();
            backend.disconnect();
            debug!("{kind} backend released");
        }
        // The device forgot its locks with the connection.
        *self.axis_lock.lock() = AxisLockManager::new();
        self.single_mask.lock().clear();
        self.mask_set.lock().clear();
    }

    /// Releases every hardware lock and mask, then disconnects.
    pub fn cleanup(&self) {
        let axes = self.axis_lock.lock().unlock_all();
        self.send_axis_commands(&axes);

        let single = self.single_mask.lock().tick(None, false);
        let config = *self.mask_config.read();
        let set = self.mask_set.lock().tick(&config, false);
        self.send_mask_actions(&single);
        self.send_mask_actions(&set);

        if self.active_kind().is_some_and(BackendKind::supports_key_masking) {
            self.with_backend("unmask_all_keys", |b| b.unmask_all_keys());
        }
        self.disconnect_all();
        info!("Device cleanup complete");
    }

    // ── Output ────────────────────────────────────────────────────────────────

    /// Moves by an already-quantized delta.  Fractions are truncated toward zero.
    pub fn move_relative(&self, dx: f64, dy: f64) {
        let (dx, dy) = (dx as i32, dy as i32);
        self.with_backend("move", |b| b.move_relative(dx, dy));
    }

    pub fn move_curved(&self, dx: f64, dy: f64, segments: u32, ctrl_x: i32, ctrl_y: i32) {
        let (dx, dy) = (dx as i32, dy as i32);
        self.with_backend("move_curved", |b| b.move_curved(dx, dy, segments, ctrl_x, ctrl_y));
    }

    pub fn button_down(&self, button: MouseButton) {
        self.with_backend("button_down", |b| b.button(button, true));
    }

    pub fn button_up(&self, button: MouseButton) {
        self.with_backend("button_up", |b| b.button(button, false));
    }

    pub fn click(&self, button: MouseButton) {
        self.with_backend("click", |b| b.click(button));
    }

    pub fn wheel(&self, delta: i32) {
        self.with_backend("wheel", |b| b.wheel(delta));
    }

    pub fn key_down(&self, key: impl Into<KeyRef>) {
        let key = key.into();
        self.with_backend("key_down", |b| b.key_down(&key));
    }

    pub fn key_up(&self, key: impl Into<KeyRef>) {
        let key = key.into();
        self.with_backend("key_up", |b| b.key_up(&key));
    }

    pub fn key_press(&self, key: impl Into<KeyRef>) {
        let key = key.into();
        self.with_backend("key_press", |b| b.key_press(&key));
    }

    pub fn mask_key(&self, key: impl Into<KeyRef>) {
        let key = key.into();
        self.with_backend("mask_key", |b| b.mask_key(&key));
    }

    pub fn unmask_key(&self, key: impl Into<KeyRef>) {
        let key = key.into();
        self.with_backend("unmask_key", |b| b.unmask_key(&key));
    }

    pub fn unmask_all_keys(&self) {
        self.with_backend("unmask_all_keys", |b| b.unmask_all_keys());
    }

    /// Raises a MAKCU link to 4 Mbaud.
    ///
    /// # Errors
    ///
    /// [`DeviceError::TransportClosed`] when nothing is connected, otherwise
    /// whatever the backend reports.
    pub fn switch_to_4m(&self) -> Result<(), DeviceError> {
        let mut guard = self.backend.lock();
        let backend = guard
            .as_mut()
            .ok_or_else(|| DeviceError::TransportClosed("no backend connected".to_string()))?;
        backend.switch_to_4m()
    }

    // ── State queries ─────────────────────────────────────────────────────────

    /// `false` whenever nothing is connected or a switch is under way.
    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        if !self.status.read().connected {
            return false;
        }
        let live = self.state_reader().and_then(|r| r.live_button_state(button));
        live.unwrap_or_else(|| self.state.is_button_pressed(button))
    }

    /// `false` whenever nothing is connected or the backend cannot say.
    ///
    /// May wait on the device (Ferrum, DHZ) but holds no facade lock while
    /// it does.
    pub fn is_key_pressed(&self, key: impl Into<KeyRef>) -> bool {
        if !self.status.read().connected {
            return false;
        }
        let key = key.into();
        self.state_reader().is_some_and(|r| r.is_key_pressed(&key))
    }

    pub fn capabilities(&self, kind: BackendKind) -> CapabilitySet {
        kind.capabilities()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }

    /// Settings used by the most recent connect.
    pub fn settings(&self) -> BackendSettings {
        self.settings.read().clone()
    }

    /// The shared button/key table, for callers that poll it directly.
    pub fn input_state(&self) -> Arc<SharedInputState> {
        Arc::clone(&self.state)
    }

    // ── Axis locks ────────────────────────────────────────────────────────────

    pub fn set_movement_lock_config(&self, config: AxisLockConfig) {
        *self.lock_config.write() = config;
    }

    pub fn update_movement_lock(&self, lock_x: bool, lock_y: bool, channel: Channel) {
        self.update_movement_lock_at(lock_x, lock_y, channel, Instant::now());
    }

    pub fn update_movement_lock_at(&self, lock_x: bool, lock_y: bool, channel: Channel, now: Instant) {
        self.axis_lock.lock().update_movement_lock(lock_x, lock_y, channel, now);
    }

    pub fn tick_movement_lock(&self) {
        self.tick_movement_lock_at(Instant::now());
    }

    /// Ages out idle channels and sends any changed `lock_mx` / `lock_my`.
    ///
    /// Does nothing unless the active backend supports hardware locks.
    pub fn tick_movement_lock_at(&self, now: Instant) {
        if !self.active_kind().is_some_and(BackendKind::supports_hardware_locks) {
            return;
        }
        let config = *self.lock_config.read();
        let commands = self.axis_lock.lock().tick(now, &config);
        self.send_axis_commands(&commands);
    }

    // ── Button masks ──────────────────────────────────────────────────────────

    pub fn set_button_mask_config(&self, config: ButtonMaskConfig) {
        *self.mask_config.write() = config;
    }

    /// Single-slot mask: keeps `selected` (a button index) masked while aiming.
    pub fn mask_tick(&self, selected: Option<i64>, aim_running: bool) {
        if !self.active_kind().is_some_and(BackendKind::supports_hardware_locks) {
            return;
        }
        let actions = self.single_mask.lock().tick(selected, aim_running);
        self.send_mask_actions(&actions);
    }

    /// Multi-button mask: diff-applies the configured flags while aiming.
    pub fn button_mask_tick(&self, aim_running: bool) {
        if !self.active_kind().is_some_and(BackendKind::supports_hardware_locks) {
            return;
        }
        let config = *self.mask_config.read();
        let actions = self.mask_set.lock().tick(&config, aim_running);
        self.send_mask_actions(&actions);
    }

    pub fn masked_button(&self) -> Option<MouseButton> {
        self.single_mask.lock().applied()
    }

    pub fn masked_buttons(&self) -> u8 {
        self.mask_set.lock().applied()
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        self.reader.read().clone()
    }

    fn active_kind(&self) -> Option<BackendKind> {
        self.backend.lock().as_ref().map(|b| b.kind())
    }

    fn send_axis_commands(&self, commands: &[AxisCommand]) {
        for command in commands {
            debug!("axis {:?} locked={}", command.axis, command.locked);
            self.with_backend("lock_axis", |b| b.lock_axis(command.axis, command.locked));
        }
    }

    fn send_mask_actions(&self, actions: &[MaskAction]) {
        for action in actions {
            debug!("button {} masked={}", action.button, action.locked);
            self.with_backend("lock_button", |b| b.lock_button(action.button, action.locked));
        }
    }

    /// Runs `f` on the active backend; a no-op when disconnected.
    fn with_backend<F>(&self, op: &str, f: F)
    where
        F: FnOnce(&mut dyn Backend) -> Result<(), DeviceError>,
    {
        let mut guard = self.backend.lock();
        let Some(backend) = guard.as_mut() else {
            return;
        };
        if let Err(e) = f(backend.as_mut()) {
            if self.send_warned.swap(true, Ordering::Relaxed) {
                debug!("{op} failed: {e}");
            } else {
                error!("{} {op} failed: {e}", backend.kind());
            }
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.get_mut().take() {
            backend.disconnect();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
