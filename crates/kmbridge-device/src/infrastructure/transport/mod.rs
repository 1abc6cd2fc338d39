//! Byte transports: serial ports and the DHZ UDP socket.

pub mod mock;
pub mod serial;
pub mod udp;

use std::io;

pub use serial::{PortEnumerator, PortInfo, SerialLink, SerialOpener, SystemSerial};

/// Returns `true` if an I/O error means the device is gone rather than a
/// transient hiccup.
pub fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::NotFound
    )
}
