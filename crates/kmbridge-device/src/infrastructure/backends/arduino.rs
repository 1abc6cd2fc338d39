//! Arduino HID sketch backend.
//!
//! The sketch has no handshake: a port that opens is taken as connected.
//! It drives the left button only and has no keyboard support.

use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::protocol::arduino;
use kmbridge_core::{BackendKind, KeyRef, MouseButton};
use tracing::{debug, error, info, warn};

use super::serial_session::SerialSession;
use crate::application::backend::{Backend, DeviceError, SharedInputState};
use crate::application::settings::ArduinoSettings;
use crate::infrastructure::listener::ListenerStep;
use crate::infrastructure::prober::{
    preferred_then_default_bauds, probe_candidates, rank_ports, Candidate, ProbeTiming,
};
use crate::infrastructure::transport::{is_closed, PortEnumerator, SerialLink, SerialOpener};

pub const BAUD_RATES: [u32; 2] = [115_200, 9_600];

pub const PORT_HINTS: [&str; 5] = ["ARDUINO", "CH340", "CH341", "USB SERIAL", "CP210"];

const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct ArduinoBackend {
    session: SerialSession,
    use_16_bit_mouse: bool,
    warned_keyboard: bool,
}

/// Opens the first Arduino port that accepts a connection.
///
/// # Errors
///
/// - [`DeviceError::PortNotFound`] when the system has no serial ports.
/// - [`DeviceError::HandshakeFailed`] when no port could be opened.
pub fn connect(
    settings: &ArduinoSettings,
    opener: Arc<dyn SerialOpener>,
    ports: &dyn PortEnumerator,
    state: Arc<SharedInputState>,
    timing: ProbeTiming,
) -> Result<ArduinoBackend, DeviceError> {
    let port = settings.port.trim();
    let candidates: Vec<Candidate> = if port.is_empty() {
        rank_ports(&ports.list_ports(), &PORT_HINTS)
            .iter()
            .map(|name| Candidate::new(name, "Arduino"))
            .collect()
    } else {
        vec![Candidate::manual(port)]
    };
    if candidates.is_empty() {
        let msg = "No COM port available for Arduino.".to_string();
        error!("{msg}");
        return Err(DeviceError::PortNotFound(msg));
    }

    let bauds = preferred_then_default_bauds(settings.baud, &BAUD_RATES);
    let session = probe_candidates("Arduino", &candidates, &bauds, |candidate, baud| {
        let mut link = opener
            .open(&candidate.port, baud, READ_TIMEOUT)
            .map_err(|e| e.to_string())?;
        timing.pause(Duration::from_millis(100));
        link.clear_input().map_err(|e| e.to_string())?;
        Ok(SerialSession::new(link, &candidate.port))
    });

    let Some(mut session) = session else {
        let msg = if port.is_empty() {
            "Could not connect to Arduino on any detected COM port.".to_string()
        } else {
            format!("Could not connect to Arduino on manual port: {port}.")
        };
        error!("{msg}");
        return Err(DeviceError::HandshakeFailed(msg));
    };
    info!("Connected to Arduino on {} at {} baud.", session.port(), session.baud());

    let listener_state = Arc::clone(&state);
    session.start_listener("arduino", state, move |reader| line_listener(reader, listener_state))?;
    Ok(ArduinoBackend {
        session,
        use_16_bit_mouse: settings.use_16_bit_mouse,
        warned_keyboard: false,
    })
}

/// Listener body that reads `BD:n` / `BU:n` lines.
fn line_listener(
    mut reader: Box<dyn SerialLink>,
    state: Arc<SharedInputState>,
) -> impl FnMut() -> ListenerStep + Send + 'static {
    let mut line = Vec::new();
    let mut buf = [0u8; 64];
    move || {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if is_closed(&e) => {
                error!("Arduino listener exception: {e}");
                return ListenerStep::Stop;
            }
            Err(e) => {
                warn!("Arduino listener error: {e}");
                std::thread::sleep(Duration::from_millis(5));
                return ListenerStep::Continue;
            }
        };
        for &byte in &buf[..n] {
            if byte != b'\n' {
                line.push(byte);
                continue;
            }
            let text = String::from_utf8_lossy(&line).into_owned();
            line.clear();
            match arduino::parse_line(&text) {
                Ok(Some(event)) => state.set_button(event.button, event.pressed),
                Ok(None) => {}
                Err(e) => debug!("Arduino: {e}"),
            }
        }
        ListenerStep::Continue
    }
}

impl ArduinoBackend {
    fn warn_keyboard(&mut self) {
        if !self.warned_keyboard {
            self.warned_keyboard = true;
            warn!("Arduino backend keyboard API is not implemented in current firmware bridge.");
        }
    }
}

impl Backend for ArduinoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Arduino
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        if self.use_16_bit_mouse {
            return self.session.write(&arduino::move_line(dx, dy));
        }
        for (step_x, step_y) in arduino::segment_move(dx, dy) {
            self.session.write(&arduino::move_line(step_x, step_y))?;
        }
        Ok(())
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        if button != MouseButton::Left {
            debug!("Arduino sketch has no {button} button");
            return Ok(());
        }
        self.session.write(&arduino::left_line(pressed))
    }

    fn click(&mut self, button: MouseButton) -> Result<(), DeviceError> {
        if button != MouseButton::Left {
            debug!("Arduino sketch has no {button} button");
            return Ok(());
        }
        self.session.write(&arduino::click_line())
    }

    fn key_down(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        self.warn_keyboard();
        Ok(())
    }

    fn key_up(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        self.warn_keyboard();
        Ok(())
    }

    fn key_press(&mut self, _key: &KeyRef) -> Result<(), DeviceError> {
        self.warn_keyboard();
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.session.is_open() {
            info!("Arduino disconnected from {}", self.session.port());
        }
        self.session.close();
    }
}
