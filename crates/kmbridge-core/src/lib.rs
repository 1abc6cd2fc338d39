//! # kmbridge-core
//!
//! Shared library for kmbridge containing the device wire codecs, the
//! device-independent state machines, and key code translation tables.
//!
//! This crate is used by the device crate and its binary.  It has zero
//! dependencies on OS APIs, serial ports, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! kmbridge drives a mouse and keyboard through one of nine kinds of hardware
//! or OS facility: USB serial boards (MAKCU, MakV2, Arduino, Ferrum), network
//! boxes (kmNet, DHZ), vendor libraries (kmboxA) and Windows `SendInput`.
//! Callers only ever ask for two things: "move by (dx, dy)" and "is this
//! button or key currently pressed".
//!
//! This crate (`kmbridge-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel to each device.  Text commands
//!   (`km.move(1,2)\r`), binary frames (`50 0D 04 00 …`), rotated UDP text
//!   and Arduino lines are encoded and decoded here.
//!
//! - **`domain`** – Pure logic with no I/O.  Button state tables, the
//!   movement quantizer, the axis lock and button mask state machines, and
//!   the VID/PID parser live here so they can be tested with synthetic input.
//!
//! - **`keymap`** – Translation between symbolic key names, Windows
//!   virtual-key codes and USB HID usage IDs.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `kmbridge_core::BackendKind` instead of `kmbridge_core::domain::backend::BackendKind`.
pub use domain::axis_lock::{Axis, AxisCommand, AxisLockConfig, AxisLockManager, MovementLockState};
pub use domain::backend::{BackendKind, CapabilitySet};
pub use domain::buttons::{ButtonStateTable, ButtonTransition, KeyStateCache, MouseButton};
pub use domain::mask::{ButtonMaskConfig, ButtonMaskSet, MaskAction, SingleSlotMask};
pub use domain::quantizer::{Channel, MovementQuantizer, Residual};
pub use domain::vid_pid::{format_vid_pid, parse_vid_pid, VidPidError};
pub use keymap::hid::HidKeyCode;
pub use keymap::{KeyMapper, KeyRef};
pub use protocol::ProtocolError;
