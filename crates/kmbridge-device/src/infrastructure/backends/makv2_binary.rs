//! MakV2 binary-framed backend.
//!
//! Movement and the three primary buttons go out as `0x50` frames.  The
//! firmware has no binary codes for keys, side buttons, the wheel or locks,
//! so those are written as `km.` text lines on the same port.

use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::protocol::binary::{self, StatusDecoder};
use kmbridge_core::protocol::km_text::KmCommand;
use kmbridge_core::{Axis, BackendKind, KeyMapper, KeyRef, MouseButton};
use tracing::{debug, error, info};

use super::serial_session::{mask_listener, version_handshake, SerialSession, RUN_TIMEOUT};
use crate::application::backend::{Backend, DeviceError, SharedInputState};
use crate::application::settings::MakV2Settings;
use crate::infrastructure::prober::{
    fixed_or_default_bauds, probe_candidates, supported_ports, Candidate, ProbeTiming,
};
use crate::infrastructure::transport::{PortEnumerator, SerialOpener};

pub const BAUD_RATES: [u32; 4] = [4_000_000, 2_000_000, 1_000_000, 115_200];

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

pub struct BinaryBackend {
    session: SerialSession,
}

/// Probes and connects a MakV2 binary device.
///
/// # Errors
///
/// - [`DeviceError::PortNotFound`] when no supported adapter is present.
/// - [`DeviceError::HandshakeFailed`] when nothing answered the version frame.
pub fn connect(
    settings: &MakV2Settings,
    opener: Arc<dyn SerialOpener>,
    ports: &dyn PortEnumerator,
    state: Arc<SharedInputState>,
    timing: ProbeTiming,
) -> Result<BinaryBackend, DeviceError> {
    let port = settings.port.trim();
    let candidates = if port.is_empty() {
        supported_ports(&ports.list_ports())
    } else {
        vec![Candidate::manual(port)]
    };
    if candidates.is_empty() {
        let msg = "No supported serial devices found for MakV2Binary.".to_string();
        error!("{msg}");
        return Err(DeviceError::PortNotFound(msg));
    }

    let bauds = fixed_or_default_bauds(settings.baud, &BAUD_RATES);
    let session = probe_candidates("MakV2Binary", &candidates, &bauds, |candidate, baud| {
        open_candidate(opener.as_ref(), candidate, baud, timing)
    });

    let Some(session) = session else {
        let msg = "Could not connect to any supported serial device for MakV2Binary.".to_string();
        error!("{msg}");
        return Err(DeviceError::HandshakeFailed(msg));
    };
    info!("Connected to MakV2Binary on {} at {} baud.", session.port(), session.baud());

    let mut backend = BinaryBackend { session };
    backend.session.write(&binary::buttons_frame(true))?;
    let listener_state = Arc::clone(&state);
    backend.session.start_listener("makv2-binary", state, move |reader| {
        let mut decoder = StatusDecoder::new();
        mask_listener("makv2-binary", reader, listener_state, move |byte| decoder.feed(byte))
    })?;
    Ok(backend)
}

fn open_candidate(
    opener: &dyn SerialOpener,
    candidate: &Candidate,
    baud: u32,
    timing: ProbeTiming,
) -> Result<SerialSession, String> {
    let mut probe = opener
        .open(&candidate.port, baud, PROBE_TIMEOUT)
        .map_err(|e| e.to_string())?;
    timing.pause(Duration::from_millis(100));
    let verified = version_handshake(
        probe.as_mut(),
        timing,
        &binary::version_frame(),
        Duration::from_millis(100),
        PROBE_TIMEOUT,
        binary::is_version_response,
    );
    drop(probe);
    timing.pause(Duration::from_millis(100));
    verified?;

    let link = opener
        .open(&candidate.port, baud, RUN_TIMEOUT)
        .map_err(|e| e.to_string())?;
    Ok(SerialSession::new(link, &candidate.port))
}

impl BinaryBackend {
    fn text(&mut self, command: KmCommand) -> Result<(), DeviceError> {
        self.session.write(&command.encode())
    }

    fn hid(key: &KeyRef) -> Option<u32> {
        let hid = KeyMapper::to_hid(key);
        if hid.is_none() {
            debug!("MakV2Binary: cannot resolve key {key}");
        }
        hid
    }
}

impl Backend for BinaryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MakV2Binary
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        self.session.write(&binary::move_frame(dx, dy))
    }

    fn move_curved(
        &mut self,
        dx: i32,
        dy: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> Result<(), DeviceError> {
        self.session
            .write(&binary::move_curved_frame(dx, dy, segments, ctrl_x, ctrl_y))
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        match binary::button_frame(button.index(), pressed) {
            Some(frame) => self.session.write(&frame),
            None => self.text(KmCommand::Button { button, pressed }),
        }
    }

    fn wheel(&mut self, delta: i32) -> Result<(), DeviceError> {
        self.text(KmCommand::Wheel(delta))
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::hid(key) {
            Some(hid) => self.text(KmCommand::KeyDown(hid)),
            None => Ok(()),
        }
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::hid(key) {
            Some(hid) => self.text(KmCommand::KeyUp(hid)),
            None => Ok(()),
        }
    }

    fn key_press(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::hid(key) {
            Some(hid) => self.text(KmCommand::KeyPress(hid)),
            None => Ok(()),
        }
    }

    fn lock_button(&mut self, button: MouseButton, locked: bool) -> Result<(), DeviceError> {
        self.text(KmCommand::LockButton { button, locked })
    }

    fn lock_axis(&mut self, axis: Axis, locked: bool) -> Result<(), DeviceError> {
        self.text(KmCommand::LockAxis { axis, locked })
    }

    fn disconnect(&mut self) {
        if self.session.is_open() {
            info!("MakV2Binary disconnected from {}", self.session.port());
        }
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::{MockSerialOpener, ScriptedPort, StaticPorts};
    use crate::infrastructure::transport::PortInfo;

    fn connected() -> (BinaryBackend, ScriptedPort, Arc<SharedInputState>) {
        let device = ScriptedPort::new();
        device.respond_to(&binary::version_frame(), &[0xBF, 0x03, 0x01]);
        let opener = Arc::new(MockSerialOpener::new());
        opener.add("COM6", 4_000_000, device.clone());
        let ports = StaticPorts(vec![PortInfo::usb("COM6", 0x1A86, 0x5523, "USB-SERIAL CH343")]);
        let state = Arc::new(SharedInputState::new());
        let backend = connect(
            &MakV2Settings::default(),
            opener,
            &ports,
            Arc::clone(&state),
            ProbeTiming::scaled(0.0),
        )
        .ok()
        .unwrap();
        (backend, device, state)
    }

    #[test]
    fn test_connect_sends_version_frame_then_buttons_frame() {
        // Arrange / Act
        let (mut backend, device, _) = connected();

        // Assert
        let written = device.written();
        assert!(written.starts_with(&binary::version_frame()));
        assert!(written.ends_with(&binary::buttons_frame(true)));
        backend.disconnect();
    }

    #[test]
    fn test_primary_buttons_are_frames_and_side_buttons_text() {
        // Arrange
        let (mut backend, device, _) = connected();
        device.clear_written();

        // Act
        backend.button(MouseButton::Left, true).unwrap();
        backend.button(MouseButton::Side1, true).unwrap();

        // Assert
        let mut expected = vec![0x50, 0x08, 0x01, 0x00, 0x01];
        expected.extend_from_slice(b"km.side1(1)\r");
        assert_eq!(device.written(), expected);
        backend.disconnect();
    }

    #[test]
    fn test_keys_and_locks_use_text_lines() {
        let (mut backend, device, _) = connected();
        device.clear_written();
        backend.key_press(&KeyRef::from("SPACE")).unwrap();
        backend.lock_button(MouseButton::Middle, true).unwrap();
        assert_eq!(device.written_text(), "km.press(44)\rkm.lock_mm(1)\r");
        backend.disconnect();
    }

    #[test]
    fn test_listener_decodes_prefixed_status() {
        // Arrange
        let (mut backend, device, state) = connected();

        // Act
        device.push_incoming(&[0x02, 0x04]);
        for _ in 0..200 {
            if state.is_button_pressed(MouseButton::Middle) {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        // Assert
        assert!(state.is_button_pressed(MouseButton::Middle));
        backend.disconnect();
        assert!(!state.is_button_pressed(MouseButton::Middle));
    }

    #[test]
    fn test_no_adapter_message() {
        let result = connect(
            &MakV2Settings::default(),
            Arc::new(MockSerialOpener::new()),
            &StaticPorts::default(),
            Arc::new(SharedInputState::new()),
            ProbeTiming::scaled(0.0),
        );
        let err = result.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("No supported serial devices found for MakV2Binary."));
    }
}
