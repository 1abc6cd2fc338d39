//! Wire codecs for every device protocol the bridge speaks.
//!
//! Each submodule is a pure encoder/decoder: it turns typed commands into the
//! exact bytes a device expects and parses what the device sends back.  None
//! of them open a port or a socket.
//!
//! # Module map (for beginners)
//!
//! - **`km_text`** – the `km.<cmd>(<args>)\r` text protocol spoken by MAKCU
//!   and MakV2 firmware.
//! - **`binary`** – the `0x50`-framed binary protocol of MakV2 binary mode.
//! - **`dhz`** – the Caesar-rotated UDP text protocol of DHZ boxes.
//! - **`ferrum`** – the Ferrum `km.mouse_*` / `km.key_*` text protocol.
//! - **`arduino`** – the one-letter line protocol of the Arduino sketch.

pub mod arduino;
pub mod binary;
pub mod dhz;
pub mod ferrum;
pub mod km_text;

use thiserror::Error;

/// Errors that can occur while encoding or decoding device traffic.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A binary frame did not start with the expected magic byte.
    #[error("bad frame magic: 0x{0:02X}")]
    BadMagic(u8),

    /// The frame's length field does not match the bytes that follow it.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A payload does not fit in the 16-bit length field.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// A text command or line could not be parsed.
    #[error("malformed command: {0}")]
    MalformedCommand(String),
}

/// Splits `name(arg, arg, …)` into the name and its trimmed arguments.
///
/// An empty argument list yields an empty vector.
pub(crate) fn split_call(text: &str) -> Result<(&str, Vec<&str>), ProtocolError> {
    let malformed = || ProtocolError::MalformedCommand(text.to_string());
    let open = text.find('(').ok_or_else(malformed)?;
    let inner = text[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let name = text[..open].trim();
    if name.is_empty() {
        return Err(malformed());
    }
    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    };
    Ok((name, args))
}

pub(crate) fn parse_arg<T: std::str::FromStr>(text: &str, arg: &str) -> Result<T, ProtocolError> {
    arg.parse()
        .map_err(|_| ProtocolError::MalformedCommand(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_call_with_arguments() {
        let (name, args) = split_call("move(1, -2)").unwrap();
        assert_eq!(name, "move");
        assert_eq!(args, vec!["1", "-2"]);
    }

    #[test]
    fn test_split_call_without_arguments() {
        let (name, args) = split_call("version()").unwrap();
        assert_eq!(name, "version");
        assert!(args.is_empty());
    }

    #[test]
    fn test_split_call_rejects_missing_parenthesis() {
        assert!(matches!(split_call("version"), Err(ProtocolError::MalformedCommand(_))));
        assert!(matches!(split_call("(1)"), Err(ProtocolError::MalformedCommand(_))));
    }
}
