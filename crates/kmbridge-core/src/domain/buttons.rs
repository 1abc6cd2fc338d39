//! Mouse buttons and the cached button/key state the listeners maintain.
//!
//! Devices that push state send one status byte per change.  Bit `i` of that
//! byte is button `i` in [`MouseButton`] order.  The [`ButtonStateTable`]
//! decodes only the bits that changed since the previous byte, so a repeated
//! byte is a no-op.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of tracked mouse buttons.
pub const BUTTON_COUNT: usize = 5;

/// A physical mouse button, indexed in device bitmask order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
    Side1 = 3,
    Side2 = 4,
}

impl MouseButton {
    pub const ALL: [MouseButton; BUTTON_COUNT] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Side1,
        MouseButton::Side2,
    ];

    /// Returns the button at bitmask position `index`, or `None` outside 0..5.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-bit mask for this button in a status byte.
    pub fn mask(self) -> u8 {
        1 << self.index()
    }

    /// The lowercase name text protocols use (`left`, `side1`, …).
    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
            MouseButton::Side1 => "side1",
            MouseButton::Side2 => "side2",
        }
    }
}

impl std::fmt::Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A pressed/released transition produced by decoding a status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonTransition {
    pub button: MouseButton,
    pub pressed: bool,
}

/// Five-button pressed table plus the last status byte seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonStateTable {
    pressed: [bool; BUTTON_COUNT],
    last_mask: u8,
}

impl ButtonStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a pushed status byte and returns the transitions it caused.
    ///
    /// Bits above the fifth are ignored when deciding transitions but are
    /// still remembered as part of `last_mask`.
    pub fn apply_mask(&mut self, mask: u8) -> Vec<ButtonTransition> {
        let changed = self.last_mask ^ mask;
        self.last_mask = mask;
        MouseButton::ALL
            .iter()
            .filter(|button| changed & button.mask() != 0)
            .map(|&button| {
                let pressed = mask & button.mask() != 0;
                self.pressed[button.index()] = pressed;
                ButtonTransition { button, pressed }
            })
            .collect()
    }

    /// Sets one button directly (query-polling backends).
    pub fn set(&mut self, button: MouseButton, pressed: bool) {
        self.pressed[button.index()] = pressed;
        if pressed {
            self.last_mask |= button.mask();
        } else {
            self.last_mask &= !button.mask();
        }
    }

    pub fn is_pressed(&self, button: MouseButton) -> bool {
        self.pressed[button.index()]
    }

    pub fn last_mask(&self) -> u8 {
        self.last_mask
    }

    /// Clears every button to released and forgets the last status byte.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sparse key code → pressed map for backends that answer key-state queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStateCache {
    keys: HashMap<u32, bool>,
}

impl KeyStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, code: u32, pressed: bool) {
        self.keys.insert(code, pressed);
    }

    /// Last known state, or `None` if the key was never reported.
    pub fn get(&self, code: u32) -> Option<bool> {
        self.keys.get(&code).copied()
    }

    pub fn reset(&mut self) {
        self.keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
