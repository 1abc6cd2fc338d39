//! Button mask managers.
//!
//! MAKCU-family firmware can swallow a physical button (`km.lock_ml(1)`) so
//! the host never sees it while the device still reports it to us.  Two
//! independent mechanisms decide which buttons to mask:
//!
//! - [`SingleSlotMask`]: at most one button, chosen per tick, masked only
//!   while aiming runs.
//! - [`ButtonMaskSet`]: any subset of buttons from per-button flags, diffed
//!   against what is currently applied.
//!
//! Both only emit [`MaskAction`]s for *changes*, and neither writes to a
//! transport itself.

use serde::{Deserialize, Serialize};

use super::buttons::{MouseButton, BUTTON_COUNT};

/// A lock or unlock to send for one button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskAction {
    pub button: MouseButton,
    pub locked: bool,
}

impl MaskAction {
    fn lock(button: MouseButton) -> Self {
        Self { button, locked: true }
    }

    fn unlock(button: MouseButton) -> Self {
        Self { button, locked: false }
    }
}

// ── Single slot ───────────────────────────────────────────────────────────────

/// Masks at most one button at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleSlotMask {
    applied: Option<MouseButton>,
}

impl SingleSlotMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Option<MouseButton> {
        self.applied
    }

    /// Advances the mask toward `selected`.
    ///
    /// An index outside 0..5 is treated as "nothing selected".  When aiming
    /// is not running or nothing is selected the applied button is released.
    pub fn tick(&mut self, selected: Option<i64>, aim_running: bool) -> Vec<MaskAction> {
        let selected = selected
            .and_then(|i| usize::try_from(i).ok())
            .and_then(MouseButton::from_index);

        let mut actions = Vec::new();
        let target = if aim_running { selected } else { None };
        if self.applied == target {
            return actions;
        }
        if let Some(old) = self.applied.take() {
            actions.push(MaskAction::unlock(old));
        }
        if let Some(new) = target {
            actions.push(MaskAction::lock(new));
            self.applied = Some(new);
        }
        actions
    }

    /// Forgets the applied button without emitting anything.
    ///
    /// Used when the backend disconnects and the device state is gone anyway.
    pub fn clear(&mut self) {
        self.applied = None;
    }
}

// ── Multi-button set ──────────────────────────────────────────────────────────

/// Per-button mask flags, as configured by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMaskConfig {
    /// Master switch; when off every applied lock is released.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub middle: bool,
    #[serde(default)]
    pub side1: bool,
    #[serde(default)]
    pub side2: bool,
}

impl ButtonMaskConfig {
    /// The buttons whose flag is set, as a status-byte style bitmask.
    pub fn desired_mask(&self) -> u8 {
        let flags = [self.left, self.right, self.middle, self.side1, self.side2];
        flags
            .iter()
            .zip(MouseButton::ALL)
            .filter(|(on, _)| **on)
            .fold(0, |acc, (_, button)| acc | button.mask())
    }
}

/// Diff-applies a desired set of masked buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonMaskSet {
    applied: u8,
}

impl ButtonMaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently masked buttons as a bitmask.
    pub fn applied(&self) -> u8 {
        self.applied
    }

    /// Unlocks `applied − desired`, then locks `desired − applied`.
    ///
    /// When `aim_running` is false or the config is disabled the desired set
    /// is empty, so every applied lock is released.
    pub fn tick(&mut self, config: &ButtonMaskConfig, aim_running: bool) -> Vec<MaskAction> {
        let desired = if config.enabled && aim_running {
            config.desired_mask()
        } else {
            0
        };
        let to_unlock = self.applied & !desired;
        let to_lock = desired & !self.applied;

        let mut actions: Vec<MaskAction> = buttons_in(to_unlock).map(MaskAction::unlock).collect();
        actions.extend(buttons_in(to_lock).map(MaskAction::lock));
        self.applied = desired;
        actions
    }

    pub fn clear(&mut self) {
        self.applied = 0;
    }
}

fn buttons_in(mask: u8) -> impl Iterator<Item = MouseButton> {
    (0..BUTTON_COUNT)
        .filter_map(MouseButton::from_index)
        .filter(move |b| mask & b.mask() != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── SingleSlotMask ────────────────────────────────────────────────────────

    #[test]
    fn test_single_slot_locks_selected_button_while_aiming() {
        // Arrange
        let mut mask = SingleSlotMask::new();

        // Act
        let actions = mask.tick(Some(1), true);

        // Assert
        assert_eq!(actions, vec![MaskAction::lock(MouseButton::Right)]);
        assert_eq!(mask.applied(), Some(MouseButton::Right));
    }

    #[test]
    fn test_single_slot_is_idempotent_for_same_selection() {
        let mut mask = SingleSlotMask::new();
        mask.tick(Some(1), true);

        assert!(mask.tick(Some(1), true).is_empty());
    }

    #[test]
    fn test_single_slot_switches_by_unlocking_old_first() {
        let mut mask = SingleSlotMask::new();
        mask.tick(Some(0), true);

        let actions = mask.tick(Some(3), true);

        assert_eq!(
            actions,
            vec![MaskAction::unlock(MouseButton::Left), MaskAction::lock(MouseButton::Side1)]
        );
    }

    #[test]
    fn test_single_slot_releases_when_aim_stops() {
        let mut mask = SingleSlotMask::new();
        mask.tick(Some(2), true);

        let actions = mask.tick(Some(2), false);

        assert_eq!(actions, vec![MaskAction::unlock(MouseButton::Middle)]);
        assert_eq!(mask.applied(), None);
    }

    #[test]
    fn test_single_slot_invalid_index_counts_as_none() {
        let mut mask = SingleSlotMask::new();
        mask.tick(Some(4), true);

        let actions = mask.tick(Some(7), true);
        assert_eq!(actions, vec![MaskAction::unlock(MouseButton::Side2)]);

        assert!(mask.tick(Some(-1), true).is_empty());
        assert!(mask.tick(None, true).is_empty());
    }

    // ── ButtonMaskSet ─────────────────────────────────────────────────────────

    #[test]
    fn test_mask_set_locks_configured_buttons() {
        // Arrange
        let mut set = ButtonMaskSet::new();
        let config = ButtonMaskConfig { enabled: true, left: true, side2: true, ..Default::default() };

        // Act
        let actions = set.tick(&config, true);

        // Assert
        assert_eq!(
            actions,
            vec![MaskAction::lock(MouseButton::Left), MaskAction::lock(MouseButton::Side2)]
        );
        assert_eq!(set.applied(), 0b10001);
    }

    #[test]
    fn test_mask_set_applies_only_the_difference() {
        let mut set = ButtonMaskSet::new();
        let first = ButtonMaskConfig { enabled: true, left: true, right: true, ..Default::default() };
        set.tick(&first, true);

        let second = ButtonMaskConfig { enabled: true, right: true, middle: true, ..Default::default() };
        let actions = set.tick(&second, true);

        assert_eq!(
            actions,
            vec![MaskAction::unlock(MouseButton::Left), MaskAction::lock(MouseButton::Middle)]
        );
    }

    #[test]
    fn test_mask_set_releases_everything_when_nothing_runs() {
        let mut set = ButtonMaskSet::new();
        let config = ButtonMaskConfig { enabled: true, left: true, right: true, ..Default::default() };
        set.tick(&config, true);

        let actions = set.tick(&config, false);

        assert_eq!(
            actions,
            vec![MaskAction::unlock(MouseButton::Left), MaskAction::unlock(MouseButton::Right)]
        );
        assert_eq!(set.applied(), 0);
    }

    #[test]
    fn test_mask_set_disabled_config_masks_nothing() {
        let mut set = ButtonMaskSet::new();
        let config = ButtonMaskConfig { enabled: false, left: true, ..Default::default() };

        assert!(set.tick(&config, true).is_empty());
    }
}
