//! Windows `SendInput` backend.
//!
//! No device is involved: events go straight into the OS input queue and
//! state is read from the OS async key table, so there is no listener.

use std::sync::Arc;

use kmbridge_core::{BackendKind, KeyMapper, KeyRef, MouseButton};
use tracing::{debug, info};

use crate::application::backend::{Backend, DeviceError, StateReader};
use crate::infrastructure::os_input::{InputInjector, OsKeyState};

pub struct SendInputBackend {
    injector: Arc<dyn InputInjector>,
    os_state: Arc<OsKeyState>,
}

impl SendInputBackend {
    pub fn new(injector: Arc<dyn InputInjector>) -> Self {
        info!("SendInput backend ready");
        let os_state = Arc::new(OsKeyState::new(Arc::clone(&injector)));
        Self { injector, os_state }
    }

    fn vk(key: &KeyRef) -> Option<u32> {
        let vk = KeyMapper::to_vk(key);
        if vk.is_none() {
            debug!("SendInput: cannot resolve key {key}");
        }
        vk
    }
}

impl Backend for SendInputBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SendInput
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        Ok(self.injector.move_relative(dx, dy)?)
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        Ok(self.injector.button(button, pressed)?)
    }

    fn wheel(&mut self, delta: i32) -> Result<(), DeviceError> {
        Ok(self.injector.wheel(delta)?)
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::vk(key) {
            Some(vk) => Ok(self.injector.key(vk, true)?),
            None => Ok(()),
        }
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::vk(key) {
            Some(vk) => Ok(self.injector.key(vk, false)?),
            None => Ok(()),
        }
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        Some(Arc::clone(&self.os_state) as Arc<dyn StateReader>)
    }

    fn disconnect(&mut self) {
        debug!("SendInput backend released");
    }
}
