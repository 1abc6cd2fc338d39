//! Hardware axis lock state machine.
//!
//! MAKCU-family firmware can suppress the physical mouse on one axis
//! (`km.lock_mx(1)` / `km.lock_my(1)`) while software movement continues.
//! Aim code calls [`AxisLockManager::update_movement_lock`] whenever it moves,
//! and a periodic ticker calls [`AxisLockManager::tick`], which ages out a
//! channel that has gone quiet and reports which axis commands must be sent.
//!
//! The manager never touches a transport.  It returns [`AxisCommand`]s and
//! the caller writes them, so the whole machine is testable with synthetic
//! timestamps.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::quantizer::Channel;

/// A channel whose last move is older than this is considered idle.
pub const MOVEMENT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// One `lock_mx` / `lock_my` command to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCommand {
    pub axis: Axis,
    pub locked: bool,
}

/// Which axes each channel is allowed to lock while it is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLockConfig {
    #[serde(default)]
    pub main_x: bool,
    #[serde(default)]
    pub main_y: bool,
    #[serde(default)]
    pub sec_x: bool,
    #[serde(default)]
    pub sec_y: bool,
}

/// Snapshot of what is locked on the device and which channels are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementLockState {
    pub lock_x: bool,
    pub lock_y: bool,
    pub main_locked: bool,
    pub sec_locked: bool,
    pub last_main_move: Option<Instant>,
    pub last_sec_move: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct AxisLockManager {
    state: MovementLockState,
    timeout: Duration,
}

impl Default for AxisLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisLockManager {
    pub fn new() -> Self {
        Self::with_timeout(MOVEMENT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: MovementLockState::default(),
            timeout,
        }
    }

    pub fn state(&self) -> MovementLockState {
        self.state
    }

    /// Records that `channel` moved (or stopped wanting a lock) at `now`.
    ///
    /// The channel counts as locked when either axis flag is set.  The
    /// timestamp only advances while a lock is requested.
    pub fn update_movement_lock(&mut self, lock_x: bool, lock_y: bool, channel: Channel, now: Instant) {
        let wants_lock = lock_x || lock_y;
        let (locked, last_move) = match channel {
            Channel::Main => (&mut self.state.main_locked, &mut self.state.last_main_move),
            Channel::Secondary => (&mut self.state.sec_locked, &mut self.state.last_sec_move),
        };
        *locked = wants_lock;
        if wants_lock {
            *last_move = Some(now);
        }
    }

    /// Ages out idle channels and returns the axis commands whose state changed.
    pub fn tick(&mut self, now: Instant, config: &AxisLockConfig) -> Vec<AxisCommand> {
        let timeout = self.timeout;
        let expired = |last: Option<Instant>| {
            last.map_or(true, |t| now.saturating_duration_since(t) > timeout)
        };
        if self.state.main_locked && expired(self.state.last_main_move) {
            self.state.main_locked = false;
        }
        if self.state.sec_locked && expired(self.state.last_sec_move) {
            self.state.sec_locked = false;
        }

        let should_x = (config.main_x && self.state.main_locked) || (config.sec_x && self.state.sec_locked);
        let should_y = (config.main_y && self.state.main_locked) || (config.sec_y && self.state.sec_locked);

        let mut commands = Vec::new();
        if self.state.lock_x != should_x {
            self.state.lock_x = should_x;
            commands.push(AxisCommand { axis: Axis::X, locked: should_x });
        }
        if self.state.lock_y != should_y {
            self.state.lock_y = should_y;
            commands.push(AxisCommand { axis: Axis::Y, locked: should_y });
        }
        commands
    }

    /// Resets everything and returns unconditional unlocks for both axes.
    pub fn unlock_all(&mut self) -> [AxisCommand; 2] {
        self.state = MovementLockState::default();
        [
            AxisCommand { axis: Axis::X, locked: false },
            AxisCommand { axis: Axis::Y, locked: false },
        ]
    }
}
