//! An open serial connection plus its listener, shared by the serial backends.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, trace, warn};

use crate::application::backend::{DeviceError, SharedInputState};
use crate::infrastructure::listener::{ListenerHandle, ListenerStep};
use crate::infrastructure::prober::{read_window, ProbeTiming};
use crate::infrastructure::transport::{is_closed, SerialLink};

/// Port timeout used once a device is connected.
pub const RUN_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialSession {
    link: Option<Box<dyn SerialLink>>,
    port: String,
    baud: u32,
    listener: Option<ListenerHandle>,
}

impl SerialSession {
    pub fn new(link: Box<dyn SerialLink>, port: &str) -> Self {
        let baud = link.baud_rate();
        Self {
            link: Some(link),
            port: port.to_string(),
            baud,
            listener: None,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Writes one command.  Fails with `TransportClosed` after [`close`](Self::close).
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DeviceError::TransportClosed(self.port.clone()))?;
        link.write_all(bytes)?;
        Ok(())
    }

    /// Mutable access to the open link, for request/response exchanges.
    pub fn link_mut(&mut self) -> Option<&mut (dyn SerialLink + 'static)> {
        self.link.as_deref_mut()
    }

    /// Starts a listener on a cloned handle of the port.
    pub fn start_listener<F>(
        &mut self,
        name: &str,
        state: Arc<SharedInputState>,
        make_body: impl FnOnce(Box<dyn SerialLink>) -> F,
    ) -> Result<(), DeviceError>
    where
        F: FnMut() -> ListenerStep + Send + 'static,
    {
        self.stop_listener();
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| DeviceError::TransportClosed(self.port.clone()))?;
        let reader = link.try_clone()?;
        self.listener = Some(ListenerHandle::spawn(name, state, make_body(reader))?);
        Ok(())
    }

    pub fn stop_listener(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
    }

    /// Swaps in a freshly opened link at a new baud rate.
    pub fn replace_link(&mut self, link: Box<dyn SerialLink>) {
        self.baud = link.baud_rate();
        self.link = Some(link);
    }

    /// Stops the listener and closes the port.  Idempotent.
    pub fn close(&mut self) {
        self.stop_listener();
        self.link = None;
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Listener body that feeds pushed status bytes into the button table.
///
/// `decode` turns each received byte into a five-button mask, or `None` for
/// bytes that belong to command echoes.
pub fn mask_listener<D>(
    name: &'static str,
    mut reader: Box<dyn SerialLink>,
    state: Arc<SharedInputState>,
    mut decode: D,
) -> impl FnMut() -> ListenerStep + Send + 'static
where
    D: FnMut(u8) -> Option<u8> + Send + 'static,
{
    let mut buf = [0u8; 1];
    move || match reader.read(&mut buf) {
        Ok(0) => ListenerStep::Continue,
        Ok(_) => {
            if let Some(mask) = decode(buf[0]) {
                for change in state.apply_mask(mask) {
                    trace!("{name} {} {}", change.button, if change.pressed { "down" } else { "up" });
                }
            }
            ListenerStep::Continue
        }
        Err(e) if is_closed(&e) => {
            error!("{name} listener read failed: {e}");
            ListenerStep::Stop
        }
        Err(e) => {
            warn!("{name} listener read error: {e}");
            std::thread::sleep(Duration::from_millis(1));
            ListenerStep::Continue
        }
    }
}

/// Sends a version query and waits for a reply `accept` approves.
///
/// Discards stale input first, pauses `settle` after writing, then collects
/// the reply for up to `window`.
pub fn version_handshake(
    link: &mut dyn SerialLink,
    timing: ProbeTiming,
    query: &[u8],
    settle: Duration,
    window: Duration,
    accept: impl Fn(&[u8]) -> bool,
) -> Result<Vec<u8>, String> {
    link.clear_input().map_err(|e| e.to_string())?;
    link.write_all(query).map_err(|e| e.to_string())?;
    timing.pause(settle);
    let reply = read_window(link, timing.duration(window), &accept);
    if accept(&reply) {
        Ok(reply)
    } else if reply.is_empty() {
        Err("no reply to version query".to_string())
    } else {
        Err(format!("unexpected reply {:?}", String::from_utf8_lossy(&reply)))
    }
}

#[cfg(test)]
mod tests {
    use kmbridge_core::protocol::km_text;
    use kmbridge_core::MouseButton;

    use super::*;
    use crate::infrastructure::transport::mock::{MockSerialOpener, ScriptedPort};
    use crate::infrastructure::transport::SerialOpener;

    fn open(device: &ScriptedPort) -> Box<dyn SerialLink> {
        let opener = MockSerialOpener::new();
        opener.add("COM1", 115_200, device.clone());
        opener.open("COM1", 115_200, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn test_write_after_close_reports_transport_closed() {
        // Arrange
        let device = ScriptedPort::new();
        let mut session = SerialSession::new(open(&device), "COM1");

        // Act
        session.close();
        let result = session.write(b"km.move(1,1)\r");

        // Assert
        assert!(matches!(result, Err(DeviceError::TransportClosed(_))));
    }

    #[test]
    fn test_mask_listener_updates_table_from_status_bytes() {
        // Arrange
        let device = ScriptedPort::new();
        let state = Arc::new(SharedInputState::new());
        let mut body = mask_listener("test", open(&device), Arc::clone(&state), km_text::status_byte);
        device.push_incoming(b"k\x03");

        // Act
        body();
        body();

        // Assert
        assert!(state.is_button_pressed(MouseButton::Left));
        assert!(state.is_button_pressed(MouseButton::Right));
        assert!(!state.is_button_pressed(MouseButton::Middle));
    }

    #[test]
    fn test_mask_listener_stops_on_closed_port() {
        let device = ScriptedPort::new();
        let state = Arc::new(SharedInputState::new());
        let mut body = mask_listener("test", open(&device), state, km_text::status_byte);
        device.close();
        assert_eq!(body(), ListenerStep::Stop);
    }

    #[test]
    fn test_version_handshake_accepts_marker() {
        // Arrange
        let device = ScriptedPort::new();
        device.push_incoming(b"stale");
        device.respond_to(b"km.version()\r", b"km.version()\r\nMAKCU\r\n");
        let mut link = open(&device);

        // Act
        let reply = version_handshake(
            link.as_mut(),
            ProbeTiming::scaled(0.0),
            b"km.version()\r",
            Duration::from_millis(100),
            Duration::from_millis(300),
            km_text::is_makcu_version_reply,
        );

        // Assert
        assert!(reply.is_ok());
        assert_eq!(device.input_clears(), 1);
    }

    #[test]
    fn test_version_handshake_rejects_silence() {
        let device = ScriptedPort::new();
        let mut link = open(&device);
        let result = version_handshake(
            link.as_mut(),
            ProbeTiming::scaled(0.0),
            b"km.version()\r",
            Duration::ZERO,
            Duration::ZERO,
            km_text::is_makcu_version_reply,
        );
        assert_eq!(result, Err("no reply to version query".to_string()));
    }
}
