//! Device-independent state machines and value types.
//!
//! Nothing in here opens a port or a socket.  Each type takes its inputs
//! (status bytes, timestamps, configuration) as arguments and returns the
//! commands a backend should send, so all of it runs under plain unit tests.
//!
//! # Module map (for beginners)
//!
//! - **`backend`** – the nine backend kinds, their name aliases and what
//!   each one can do.
//! - **`buttons`** – mouse buttons, the five-button pressed table fed by
//!   device status bytes, and the keyboard state cache.
//! - **`quantizer`** – turns fractional per-tick movement into whole device
//!   units without losing the remainder.
//! - **`axis_lock`** – decides when to lock the physical mouse on X or Y.
//! - **`mask`** – decides which physical buttons to swallow.
//! - **`vid_pid`** – parses the many spellings of a USB VID/PID pair.

pub mod axis_lock;
pub mod backend;
pub mod buttons;
pub mod mask;
pub mod quantizer;
pub mod vid_pid;
