//! Recording input injector for tests.
//!
//! Every injected event is pushed into a `Mutex<Vec<...>>` so assertions can
//! inspect exactly what was sent and in what order.  Key state answers come
//! from a settable set of held VKs.
//!
//! # `should_fail` flag
//!
//! Set `should_fail = true` to make every injection return
//! `InjectError::Platform`, for testing error paths without a broken OS.

use std::collections::BTreeSet;

use kmbridge_core::MouseButton;
use parking_lot::Mutex;

use super::{InjectError, InputInjector};

#[derive(Debug, Default)]
pub struct MockInjector {
    pub moves: Mutex<Vec<(i32, i32)>>,
    pub buttons: Mutex<Vec<(MouseButton, bool)>>,
    pub wheels: Mutex<Vec<i32>>,
    pub keys: Mutex<Vec<(u32, bool)>>,
    /// VKs reported as held by `is_vk_down`.
    pub held: Mutex<BTreeSet<u32>>,
    pub should_fail: bool,
}

impl MockInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn hold(&self, vk: u32) {
        self.held.lock().insert(vk);
    }

    fn check(&self) -> Result<(), InjectError> {
        if self.should_fail {
            return Err(InjectError::Platform("mock failure".into()));
        }
        Ok(())
    }
}

impl InputInjector for MockInjector {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectError> {
        self.check()?;
        self.moves.lock().push((dx, dy));
        Ok(())
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<(), InjectError> {
        self.check()?;
        self.buttons.lock().push((button, pressed));
        Ok(())
    }

    fn wheel(&self, delta: i32) -> Result<(), InjectError> {
        self.check()?;
        self.wheels.lock().push(delta);
        Ok(())
    }

    fn key(&self, vk: u32, pressed: bool) -> Result<(), InjectError> {
        self.check()?;
        if vk > 0xFF {
            return Err(InjectError::InvalidKeyCode(vk));
        }
        self.keys.lock().push((vk, pressed));
        Ok(())
    }

    fn is_vk_down(&self, vk: u32) -> bool {
        self.held.lock().contains(&vk)
    }
}
