//! Backend identities, name normalisation and static capabilities.

use serde::{Deserialize, Serialize};

/// The nine supported device backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// MAKCU text protocol over USB serial.
    Serial,
    /// kmNet network box through its vendor library.
    Net,
    /// kmboxA USB box through its vendor library.
    KmboxA,
    /// DHZ box over obfuscated UDP.
    Dhz,
    /// MakV2 text protocol over USB serial.
    MakV2,
    /// MakV2 binary-framed protocol over USB serial.
    MakV2Binary,
    /// Arduino line protocol over USB serial.
    Arduino,
    /// Windows `SendInput`.
    SendInput,
    /// Ferrum text protocol over USB serial.
    Ferrum,
}

/// What a backend can do beyond mouse movement and buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub keyboard_output: bool,
    pub keyboard_state: bool,
    pub trigger_strafe_ui: bool,
}

impl BackendKind {
    pub const ALL: [BackendKind; 9] = [
        BackendKind::Serial,
        BackendKind::Net,
        BackendKind::KmboxA,
        BackendKind::Dhz,
        BackendKind::MakV2,
        BackendKind::MakV2Binary,
        BackendKind::Arduino,
        BackendKind::SendInput,
        BackendKind::Ferrum,
    ];

    /// Maps a user-supplied backend name to a kind.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unrecognised names select [`BackendKind::Serial`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "net" => BackendKind::Net,
            "kmboxa" | "kmboxa_api" | "kmboxaapi" | "kma" | "kmboxa-api" => BackendKind::KmboxA,
            "dhz" => BackendKind::Dhz,
            "makv2binary" | "makv2_binary" | "makv2-binary" | "binary" => BackendKind::MakV2Binary,
            "makv2" | "mak_v2" | "mak-v2" => BackendKind::MakV2,
            "arduino" => BackendKind::Arduino,
            "sendinput" | "win32" | "win32api" | "win32_sendinput" | "win32-sendinput" => {
                BackendKind::SendInput
            }
            "ferrum" => BackendKind::Ferrum,
            _ => BackendKind::Serial,
        }
    }

    /// Canonical display name.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Serial => "Serial",
            BackendKind::Net => "Net",
            BackendKind::KmboxA => "KmboxA",
            BackendKind::Dhz => "DHZ",
            BackendKind::MakV2 => "MakV2",
            BackendKind::MakV2Binary => "MakV2Binary",
            BackendKind::Arduino => "Arduino",
            BackendKind::SendInput => "SendInput",
            BackendKind::Ferrum => "Ferrum",
        }
    }

    pub fn capabilities(self) -> CapabilitySet {
        let (keyboard_output, keyboard_state, trigger_strafe_ui) = match self {
            BackendKind::Serial | BackendKind::MakV2 | BackendKind::MakV2Binary => (true, false, false),
            BackendKind::Arduino => (false, false, false),
            BackendKind::SendInput
            | BackendKind::Net
            | BackendKind::KmboxA
            | BackendKind::Dhz
            | BackendKind::Ferrum => (true, true, true),
        };
        CapabilitySet {
            keyboard_output,
            keyboard_state,
            trigger_strafe_ui,
        }
    }

    /// MAKCU-family firmware that understands `lock_m*` commands.
    pub fn supports_hardware_locks(self) -> bool {
        matches!(self, BackendKind::Serial | BackendKind::MakV2 | BackendKind::MakV2Binary)
    }

    /// Backends with a keyboard block/unblock command.
    pub fn supports_key_masking(self) -> bool {
        matches!(self, BackendKind::Net | BackendKind::Dhz | BackendKind::Ferrum)
    }

    /// Backends whose transport is a local serial port.
    pub fn is_serial(self) -> bool {
        matches!(
            self,
            BackendKind::Serial
                | BackendKind::MakV2
                | BackendKind::MakV2Binary
                | BackendKind::Arduino
                | BackendKind::Ferrum
        )
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_accepts_every_alias() {
        let cases = [
            ("net", BackendKind::Net),
            ("KMA", BackendKind::KmboxA),
            ("kmboxa-api", BackendKind::KmboxA),
            (" DHZ ", BackendKind::Dhz),
            ("binary", BackendKind::MakV2Binary),
            ("MakV2_Binary", BackendKind::MakV2Binary),
            ("mak-v2", BackendKind::MakV2),
            ("Arduino", BackendKind::Arduino),
            ("win32", BackendKind::SendInput),
            ("win32-sendinput", BackendKind::SendInput),
            ("ferrum", BackendKind::Ferrum),
        ];
        for (name, expected) in cases {
            assert_eq!(BackendKind::from_name(name), expected, "name {name:?}");
        }
    }

    #[test]
    fn test_unknown_name_defaults_to_serial() {
        assert_eq!(BackendKind::from_name("makcu"), BackendKind::Serial);
        assert_eq!(BackendKind::from_name(""), BackendKind::Serial);
    }

    #[test]
    fn test_display_name_round_trips_through_from_name() {
        for kind in BackendKind::ALL {
            assert_eq!(BackendKind::from_name(kind.name()), kind);
        }
    }

    #[test]
    fn test_capability_matrix() {
        // Arrange / Act
        let arduino = BackendKind::Arduino.capabilities();
        let serial = BackendKind::Serial.capabilities();
        let dhz = BackendKind::Dhz.capabilities();

        // Assert
        assert_eq!(arduino, CapabilitySet::default());
        assert!(serial.keyboard_output && !serial.keyboard_state && !serial.trigger_strafe_ui);
        assert!(dhz.keyboard_output && dhz.keyboard_state && dhz.trigger_strafe_ui);
    }

    #[test]
    fn test_lock_and_key_mask_support_sets_are_disjoint() {
        for kind in BackendKind::ALL {
            assert!(!(kind.supports_hardware_locks() && kind.supports_key_masking()), "{kind}");
        }
    }
}
