//! Connection parameters for each backend.
//!
//! These are plain serde structs so the config file can embed them
//! directly.  Every field has a default, so a partially written section
//! still deserializes.

use serde::{Deserialize, Serialize};

/// Default address of kmNet and DHZ network boxes.
pub const DEFAULT_BOX_IP: &str = "192.168.2.188";

/// Default baud rate for MakV2 text and binary firmware.
pub const DEFAULT_MAKV2_BAUD: u32 = 4_000_000;

/// Default baud rate for Arduino sketches.
pub const DEFAULT_ARDUINO_BAUD: u32 = 115_200;

/// Parameters for every backend, one section each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub makv2: MakV2Settings,
    #[serde(default)]
    pub makv2_binary: MakV2Settings,
    #[serde(default)]
    pub arduino: ArduinoSettings,
    #[serde(default)]
    pub dhz: DhzSettings,
    #[serde(default)]
    pub kmnet: KmNetSettings,
    #[serde(default)]
    pub kmboxa: KmboxASettings,
    #[serde(default)]
    pub ferrum: FerrumSettings,
}

/// How the MAKCU backend picks its port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// Scan for known USB-serial adapters.
    #[default]
    Auto,
    /// Use only the configured port.
    Manual,
}

/// MAKCU (`serial` backend) settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default)]
    pub port_mode: PortMode,
    #[serde(default)]
    pub port: String,
}

impl SerialSettings {
    /// The manual port, if manual mode is on and a port is set.
    pub fn manual_port(&self) -> Option<&str> {
        let port = self.port.trim();
        (self.port_mode == PortMode::Manual && !port.is_empty()).then_some(port)
    }
}

/// MakV2 text and MakV2 binary settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakV2Settings {
    /// Fixed port; empty means scan.
    #[serde(default)]
    pub port: String,
    /// Fixed baud rate; `0` tries the whole default list.
    #[serde(default = "default_makv2_baud")]
    pub baud: u32,
}

impl Default for MakV2Settings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: DEFAULT_MAKV2_BAUD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArduinoSettings {
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_arduino_baud")]
    pub baud: u32,
    /// Send each move as one line.  When off, moves are split into ±127
    /// steps for sketches built with an 8-bit HID report.
    #[serde(default = "default_true")]
    pub use_16_bit_mouse: bool,
}

impl Default for ArduinoSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: DEFAULT_ARDUINO_BAUD,
            use_16_bit_mouse: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhzSettings {
    #[serde(default = "default_box_ip")]
    pub ip: String,
    #[serde(default = "default_dhz_port")]
    pub port: u16,
    /// Caesar shift the box is configured with.
    #[serde(default)]
    pub random_shift: i32,
}

impl Default for DhzSettings {
    fn default() -> Self {
        Self {
            ip: DEFAULT_BOX_IP.to_string(),
            port: kmbridge_core::protocol::dhz::DEFAULT_PORT,
            random_shift: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmNetSettings {
    #[serde(default = "default_box_ip")]
    pub ip: String,
    #[serde(default = "default_kmnet_port")]
    pub port: String,
    #[serde(default)]
    pub uuid: String,
    /// Path of the vendor library.
    #[serde(default = "default_kmnet_library")]
    pub library: String,
    /// Start the module's monitor stream after init.
    #[serde(default = "default_true")]
    pub monitor: bool,
}

impl Default for KmNetSettings {
    fn default() -> Self {
        Self {
            ip: DEFAULT_BOX_IP.to_string(),
            port: default_kmnet_port(),
            uuid: String::new(),
            library: default_kmnet_library(),
            monitor: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmboxASettings {
    /// VID/PID in any spelling accepted by `parse_vid_pid`.
    #[serde(default)]
    pub vid_pid: String,
    #[serde(default = "default_kmboxa_library")]
    pub library: String,
}

impl Default for KmboxASettings {
    fn default() -> Self {
        Self {
            vid_pid: String::new(),
            library: default_kmboxa_library(),
        }
    }
}

/// Transport used to reach a Ferrum device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FerrumConnection {
    /// Serial is the only Ferrum transport, so `auto` selects it.
    Auto,
    #[default]
    Serial,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FerrumSettings {
    /// Fixed port; empty means scan.
    #[serde(default)]
    pub device_path: String,
    #[serde(default)]
    pub connection_type: FerrumConnection,
}

// ── Serde defaults ────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_makv2_baud() -> u32 {
    DEFAULT_MAKV2_BAUD
}

fn default_arduino_baud() -> u32 {
    DEFAULT_ARDUINO_BAUD
}

fn default_box_ip() -> String {
    DEFAULT_BOX_IP.to_string()
}

fn default_dhz_port() -> u16 {
    kmbridge_core::protocol::dhz::DEFAULT_PORT
}

fn default_kmnet_port() -> String {
    "6234".to_string()
}

fn default_kmnet_library() -> String {
    "kmNet.dll".to_string()
}

fn default_kmboxa_library() -> String {
    "kmboxA.dll".to_string()
}
