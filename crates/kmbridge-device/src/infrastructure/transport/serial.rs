//! Serial port seams and their `serialport` implementation.
//!
//! Backends never call `serialport` directly.  They go through three small
//! traits so tests can swap in the scripted port from [`super::mock`]:
//!
//! - [`SerialLink`]: one open port.
//! - [`SerialOpener`]: opens a port by name and baud rate.
//! - [`PortEnumerator`]: lists the ports present on the system.
//!
//! A read that times out returns `Ok(0)` rather than an error, so listener
//! loops treat "nothing arrived" and "check the stop flag" the same way.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPortType};

/// One open serial port.
pub trait SerialLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads what is available, waiting at most the port timeout.
    ///
    /// Returns `Ok(0)` when the timeout expires with nothing received.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Discards unread input.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Discards unread input and unsent output.
    fn clear_all(&mut self) -> io::Result<()>;

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    fn baud_rate(&self) -> u32;

    /// A second handle on the same port, used by the listener thread.
    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>>;
}

/// Opens serial ports.
pub trait SerialOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns an I/O error if the port does not exist or is busy.
    fn open(&self, port: &str, baud: u32, timeout: Duration) -> io::Result<Box<dyn SerialLink>>;
}

/// A serial port as seen during discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    /// System name, e.g. `COM5` or `/dev/ttyACM0`.
    pub name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    /// Human-readable description (USB product string when available).
    pub description: String,
    /// Hardware id in the `USB VID:PID=1A86:55D3` form.
    pub hwid: String,
}

impl PortInfo {
    /// Builds a USB port entry, filling `hwid` from the ids.
    pub fn usb(name: &str, vid: u16, pid: u16, description: &str) -> Self {
        Self {
            name: name.to_string(),
            vid: Some(vid),
            pid: Some(pid),
            description: description.to_string(),
            hwid: format!("USB VID:PID={vid:04X}:{pid:04X}"),
        }
    }
}

/// Lists system serial ports.
#[cfg_attr(test, mockall::automock)]
pub trait PortEnumerator: Send + Sync {
    fn list_ports(&self) -> Vec<PortInfo>;
}

// ── serialport implementation ────────────────────────────────────────────────

/// The real system serial stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

impl SerialOpener for SystemSerial {
    fn open(&self, port: &str, baud: u32, timeout: Duration) -> io::Result<Box<dyn SerialLink>> {
        let inner = serialport::new(port, baud).timeout(timeout).open()?;
        Ok(Box::new(SystemLink { inner, baud }))
    }
}

impl PortEnumerator for SystemSerial {
    fn list_ports(&self) -> Vec<PortInfo> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(port_info).collect(),
            Err(e) => {
                tracing::warn!("Serial port enumeration failed: {e}");
                Vec::new()
            }
        }
    }
}

fn port_info(port: serialport::SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => {
            let description = usb
                .product
                .or(usb.manufacturer)
                .unwrap_or_else(|| port.port_name.clone());
            PortInfo::usb(&port.port_name, usb.vid, usb.pid, &description)
        }
        SerialPortType::PciPort => PortInfo {
            description: "PCI serial port".to_string(),
            hwid: "PCI".to_string(),
            name: port.port_name,
            ..PortInfo::default()
        },
        SerialPortType::BluetoothPort => PortInfo {
            description: "Bluetooth serial port".to_string(),
            hwid: "BTHENUM".to_string(),
            name: port.port_name,
            ..PortInfo::default()
        },
        SerialPortType::Unknown => PortInfo {
            description: port.port_name.clone(),
            name: port.port_name,
            ..PortInfo::default()
        },
    }
}

struct SystemLink {
    inner: Box<dyn serialport::SerialPort>,
    baud: u32,
}

impl SerialLink for SystemLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.inner.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.inner.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(self.inner.clear(ClearBuffer::Input)?)
    }

    fn clear_all(&mut self) -> io::Result<()> {
        Ok(self.inner.clear(ClearBuffer::All)?)
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        Ok(self.inner.set_timeout(timeout)?)
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(SystemLink {
            inner: self.inner.try_clone()?,
            baud: self.baud,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_port_info_formats_hwid() {
        let info = PortInfo::usb("COM5", 0x1A86, 0x55D3, "USB-Enhanced-SERIAL");
        assert_eq!(info.hwid, "USB VID:PID=1A86:55D3");
        assert_eq!(info.vid, Some(0x1A86));
    }

    #[test]
    fn test_unknown_port_type_keeps_name_as_description() {
        // Arrange
        let raw = serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        };

        // Act
        let info = port_info(raw);

        // Assert
        assert_eq!(info.name, "/dev/ttyS0");
        assert_eq!(info.description, "/dev/ttyS0");
        assert!(info.hwid.is_empty());
    }
}
