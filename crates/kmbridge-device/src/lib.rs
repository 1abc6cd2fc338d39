//! kmbridge-device library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does kmbridge-device do? (for beginners)
//!
//! Aim and automation code wants two primitives: "move the pointer by
//! (dx, dy)" and "is this button or key pressed right now".  This crate
//! answers both through whichever device the user owns:
//!
//! 1. A [`DeviceManager`](application::device_manager::DeviceManager) holds the
//!    one active backend and exposes the uniform API.
//! 2. A `BackendFactory` probes serial ports, UDP boxes, vendor DLLs or the
//!    Windows input queue and returns a connected backend.
//! 3. Each backend starts a listener thread that keeps the shared button
//!    table current, so button queries never touch the wire.  Key queries
//!    on Ferrum and DHZ do ask the device, through a reader handle that runs
//!    outside the backend lock, so output calls never wait behind them.
//! 4. The axis lock and button mask machines from `kmbridge_core` are ticked
//!    by the host loop and turned into `lock_*` commands here.

/// Application layer: the backend contract, settings and the facade.
pub mod application;

/// Infrastructure layer: transports, backends, native modules and storage.
pub mod infrastructure;
