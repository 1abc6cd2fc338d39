//! Backend speaking the `km.` text protocol (MAKCU and MakV2 firmware).
//!
//! Connecting differs between the two firmwares (see `makcu.rs` and
//! `makv2.rs`); once a port is open they behave identically.

use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::protocol::km_text::{self, KmCommand, BAUD_CHANGE_4M};
use kmbridge_core::{Axis, BackendKind, KeyMapper, KeyRef, MouseButton};
use tracing::{debug, info, warn};

use super::serial_session::{mask_listener, version_handshake, SerialSession, RUN_TIMEOUT};
use crate::application::backend::{Backend, DeviceError, SharedInputState};
use crate::infrastructure::prober::ProbeTiming;
use crate::infrastructure::transport::SerialOpener;

pub const BAUD_4M: u32 = 4_000_000;
pub const BAUD_115200: u32 = 115_200;

/// Timeout while waiting for a version reply.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

pub struct KmTextBackend {
    kind: BackendKind,
    session: SerialSession,
    state: Arc<SharedInputState>,
    opener: Arc<dyn SerialOpener>,
    timing: ProbeTiming,
}

impl KmTextBackend {
    /// Wraps a port that has passed the handshake, enables status bytes and
    /// starts the listener.
    pub fn start(
        kind: BackendKind,
        session: SerialSession,
        state: Arc<SharedInputState>,
        opener: Arc<dyn SerialOpener>,
        timing: ProbeTiming,
    ) -> Result<Self, DeviceError> {
        let mut backend = Self {
            kind,
            session,
            state,
            opener,
            timing,
        };
        backend.enable_stream()?;
        Ok(backend)
    }

    pub fn port(&self) -> &str {
        self.session.port()
    }

    pub fn baud(&self) -> u32 {
        self.session.baud()
    }

    fn send(&mut self, command: KmCommand) -> Result<(), DeviceError> {
        self.session.write(&command.encode())
    }

    fn enable_stream(&mut self) -> Result<(), DeviceError> {
        self.send(KmCommand::Buttons(true))?;
        let name = listener_name(self.kind);
        let state = Arc::clone(&self.state);
        self.session
            .start_listener(name, Arc::clone(&self.state), move |reader| {
                mask_listener(name, reader, state, km_text::status_byte)
            })
    }

    fn hid(&self, key: &KeyRef) -> Option<u32> {
        let hid = KeyMapper::to_hid(key);
        if hid.is_none() {
            debug!("{}: cannot resolve key {key}", self.kind);
        }
        hid
    }

    fn reopen(&mut self, baud: u32) -> Result<(), DeviceError> {
        let port = self.session.port().to_string();
        let link = self.opener.open(&port, baud, RUN_TIMEOUT)?;
        self.session.replace_link(link);
        self.enable_stream()
    }
}

fn listener_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::MakV2 => "makv2",
        _ => "makcu",
    }
}

impl Backend for KmTextBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        self.send(KmCommand::Move { dx, dy })
    }

    fn move_curved(
        &mut self,
        dx: i32,
        dy: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> Result<(), DeviceError> {
        self.send(KmCommand::MoveCurved { dx, dy, segments, ctrl_x, ctrl_y })
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        self.send(KmCommand::Button { button, pressed })
    }

    fn wheel(&mut self, delta: i32) -> Result<(), DeviceError> {
        self.send(KmCommand::Wheel(delta))
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match self.hid(key) {
            Some(hid) => self.send(KmCommand::KeyDown(hid)),
            None => Ok(()),
        }
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match self.hid(key) {
            Some(hid) => self.send(KmCommand::KeyUp(hid)),
            None => Ok(()),
        }
    }

    fn key_press(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match self.hid(key) {
            Some(hid) => self.send(KmCommand::KeyPress(hid)),
            None => Ok(()),
        }
    }

    fn lock_button(&mut self, button: MouseButton, locked: bool) -> Result<(), DeviceError> {
        self.send(KmCommand::LockButton { button, locked })
    }

    fn lock_axis(&mut self, axis: Axis, locked: bool) -> Result<(), DeviceError> {
        self.send(KmCommand::LockAxis { axis, locked })
    }

    fn switch_to_4m(&mut self) -> Result<(), DeviceError> {
        if self.kind != BackendKind::Serial {
            return Err(DeviceError::Unsupported(
                "switch_to_4m is only supported in Serial mode.".to_string(),
            ));
        }
        if !self.session.is_open() {
            return Err(DeviceError::TransportClosed("Device not connected.".to_string()));
        }
        let current = self.session.baud();
        if current == BAUD_4M {
            info!("Device already at 4M baud rate.");
            return Ok(());
        }
        if current != BAUD_115200 {
            return Err(DeviceError::InvalidParameter(format!(
                "Current baud rate is {current}, not 115200. Cannot switch to 4M."
            )));
        }

        info!("Sending 4M handshake command...");
        self.session.stop_listener();
        self.session.write(&BAUD_CHANGE_4M)?;
        self.session.close();
        self.timing.pause(Duration::from_millis(150));

        let port = self.session.port().to_string();
        let verified = match self.opener.open(&port, BAUD_4M, PROBE_TIMEOUT) {
            Ok(mut probe) => {
                self.timing.pause(Duration::from_millis(100));
                let result = version_handshake(
                    probe.as_mut(),
                    self.timing,
                    &KmCommand::Version.encode(),
                    Duration::from_millis(100),
                    PROBE_TIMEOUT,
                    km_text::is_makcu_version_reply,
                );
                result.is_ok()
            }
            Err(e) => {
                warn!("Could not open {port} at 4M: {e}");
                false
            }
        };
        self.timing.pause(Duration::from_millis(100));

        if verified {
            info!("Successfully switched to 4M on {port}.");
            self.reopen(BAUD_4M)
        } else {
            warn!("4M handshake failed, reconnecting at 115200...");
            self.reopen(BAUD_115200)?;
            Err(DeviceError::HandshakeFailed(format!(
                "4M handshake failed on {port}; restored 115200 baud."
            )))
        }
    }

    fn disconnect(&mut self) {
        if self.session.is_open() {
            info!("{} disconnected from {}", self.kind, self.session.port());
        }
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::{MockSerialOpener, ScriptedPort};

    fn connected(baud: u32) -> (KmTextBackend, ScriptedPort, Arc<MockSerialOpener>) {
        let device = ScriptedPort::new();
        let opener = Arc::new(MockSerialOpener::new());
        opener.add_any_baud("COM5", device.clone());
        let link = opener.open("COM5", baud, RUN_TIMEOUT).unwrap();
        let backend = KmTextBackend::start(
            BackendKind::Serial,
            SerialSession::new(link, "COM5"),
            Arc::new(SharedInputState::new()),
            Arc::clone(&opener) as Arc<dyn SerialOpener>,
            ProbeTiming::scaled(0.0),
        )
        .unwrap();
        (backend, device, opener)
    }

    #[test]
    fn test_start_enables_button_stream() {
        let (mut backend, device, _) = connected(115_200);
        assert_eq!(device.written_text(), "km.buttons(1)\r");
        backend.disconnect();
    }

    #[test]
    fn test_commands_are_written_as_km_lines() {
        // Arrange
        let (mut backend, device, _) = connected(115_200);
        device.clear_written();

        // Act
        backend.move_relative(3, -4).unwrap();
        backend.button(MouseButton::Right, true).unwrap();
        backend.key_down(&KeyRef::from("a")).unwrap();
        backend.lock_axis(Axis::Y, true).unwrap();
        backend.key_press(&KeyRef::from("no such key")).unwrap();

        // Assert
        assert_eq!(device.written_text(), "km.move(3,-4)\rkm.right(1)\rkm.down(4)\rkm.lock_my(1)\r");
        backend.disconnect();
    }

    #[test]
    fn test_switch_to_4m_is_noop_when_already_fast() {
        let (mut backend, device, _) = connected(BAUD_4M);
        device.clear_written();
        assert!(backend.switch_to_4m().is_ok());
        assert!(device.written().is_empty());
        backend.disconnect();
    }

    #[test]
    fn test_switch_to_4m_rejects_other_baud_rates() {
        let (mut backend, _, _) = connected(2_000_000);
        assert!(matches!(backend.switch_to_4m(), Err(DeviceError::InvalidParameter(_))));
        backend.disconnect();
    }

    #[test]
    fn test_switch_to_4m_verifies_and_reopens() {
        // Arrange
        let (mut backend, device, opener) = connected(BAUD_115200);
        device.respond_to(b"km.version()\r", b"MAKCU\r\n");
        device.clear_written();

        // Act
        let result = backend.switch_to_4m();

        // Assert
        assert!(result.is_ok());
        assert_eq!(backend.baud(), BAUD_4M);
        assert!(device.written().starts_with(&BAUD_CHANGE_4M));
        assert!(device.written_text().ends_with("km.buttons(1)\r"));
        assert_eq!(opener.attempts().last(), Some(&("COM5".to_string(), BAUD_4M)));
        backend.disconnect();
    }

    #[test]
    fn test_switch_to_4m_falls_back_to_115200() {
        // Arrange: the device never answers the version query.
        let (mut backend, _, _) = connected(BAUD_115200);

        // Act
        let result = backend.switch_to_4m();

        // Assert
        assert!(matches!(result, Err(DeviceError::HandshakeFailed(_))));
        assert_eq!(backend.baud(), BAUD_115200);
        backend.disconnect();
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut backend, _, _) = connected(115_200);
        backend.disconnect();
        backend.disconnect();
        assert!(backend.move_relative(1, 1).is_err());
    }
}
