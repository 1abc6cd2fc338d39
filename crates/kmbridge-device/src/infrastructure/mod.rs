//! Infrastructure layer for the device host.
//!
//! Contains the OS-facing adapters: serial and UDP transports, the probing
//! helpers, the listener thread, the nine backends, the vendor DLL loader,
//! Windows input injection and config file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `kmbridge_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`transport`** – `SerialLink` / `SerialOpener` / `PortEnumerator` over
//!   `serialport`, the UDP request/response client, and in-memory fakes.
//! - **`prober`** – Adapter scoring, baud lists and the candidate × baud
//!   handshake loop.
//! - **`listener`** – One background thread per backend with a cooperative
//!   stop flag.
//! - **`backends`** – The nine drivers and `SystemBackendFactory`.
//! - **`native`** – Dynamically loaded kmNet / kmboxA modules and the
//!   isolated init probe.
//! - **`os_input`** – `SendInput` injection and async key state.
//! - **`storage`** – `kmbridge.toml` load and save.

pub mod backends;
pub mod listener;
pub mod native;
pub mod os_input;
pub mod prober;
pub mod storage;
pub mod transport;
