//! Application layer for the device host.
//!
//! - **`backend`** – The [`Backend`](backend::Backend) trait every driver
//!   implements, the [`BackendFactory`](backend::BackendFactory) seam, the
//!   shared input state and [`DeviceError`](backend::DeviceError).
//!
//! - **`settings`** – Per-backend connection parameters (serde structs).
//!
//! - **`device_manager`** – The facade that owns the active backend and the
//!   lock and mask state machines.

pub mod backend;
pub mod device_manager;
pub mod settings;
