//! DHZ box backend over UDP.
//!
//! Outgoing commands are fire-and-forget datagrams.  Button state is polled
//! by the listener with one `isdown_<button>()` query per button; key state
//! is queried on demand through [`DhzKeyState`], outside the facade lock.

use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::protocol::dhz;
use kmbridge_core::{BackendKind, KeyMapper, KeyRef, MouseButton};
use tracing::{debug, error, info};

use crate::application::backend::{Backend, DeviceError, SharedInputState, StateReader};
use crate::application::settings::DhzSettings;
use crate::infrastructure::listener::{ListenerHandle, ListenerStep};
use crate::infrastructure::transport::udp::{DhzClient, QUERY_TIMEOUT};

/// Timeout of the connect-time probe query.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause between button polling rounds.
pub const POLL_INTERVAL: Duration = Duration::from_millis(30);

pub struct DhzBackend {
    client: Arc<DhzClient>,
    key_state: Arc<DhzKeyState>,
    listener: Option<ListenerHandle>,
}

/// On-demand key queries; answers are cached in the shared key table.
pub struct DhzKeyState {
    client: Arc<DhzClient>,
    state: Arc<SharedInputState>,
}

impl StateReader for DhzKeyState {
    /// Tries each query spelling until the box answers; the cached value
    /// stands in when none does.
    fn is_key_pressed(&self, key: &KeyRef) -> bool {
        let Some(token) = key_token(key) else {
            return false;
        };
        let hid = KeyMapper::to_hid(key);
        let answer = dhz::key_queries(&token, hid)
            .iter()
            .find_map(|query| self.client.query_bool(query, QUERY_TIMEOUT, 0).ok());
        match (answer, hid) {
            (Some(pressed), Some(hid)) => {
                self.state.set_key(hid, pressed);
                pressed
            }
            (Some(pressed), None) => pressed,
            (None, Some(hid)) => self.state.key(hid).unwrap_or(false),
            (None, None) => false,
        }
    }
}

/// Opens the UDP socket and checks that the box answers.
///
/// # Errors
///
/// - [`DeviceError::InvalidParameter`] for an empty IP.
/// - [`DeviceError::Io`] when the socket cannot be created.
/// - [`DeviceError::HandshakeFailed`] when the probe query gets no usable reply.
pub fn connect(settings: &DhzSettings, state: Arc<SharedInputState>) -> Result<DhzBackend, DeviceError> {
    let ip = settings.ip.trim();
    if ip.is_empty() {
        let msg = "Invalid DHZ IP: empty".to_string();
        error!("{msg}");
        return Err(DeviceError::InvalidParameter(msg));
    }

    let client = DhzClient::new(ip, settings.port, settings.random_shift).map_err(|e| {
        error!("DHZ socket init failed: {e}");
        DeviceError::Io(e)
    })?;

    if let Err(e) = client.query_bool(&dhz::button_query(MouseButton::Left), PROBE_TIMEOUT, 0) {
        let msg = format!("DHZ probe failed: {e}");
        error!("{msg}");
        return Err(DeviceError::HandshakeFailed(msg));
    }

    let client = Arc::new(client);
    let poller = Arc::clone(&client);
    let poll_state = Arc::clone(&state);
    let key_state = Arc::new(DhzKeyState {
        client: Arc::clone(&client),
        state: Arc::clone(&state),
    });
    let listener = ListenerHandle::spawn("dhz", state, move || {
        poll_buttons(&poller, &poll_state);
        std::thread::sleep(POLL_INTERVAL);
        ListenerStep::Continue
    })?;
    info!(
        "Connected to DHZ at {ip}:{} (RANDOM={}).",
        settings.port,
        client.shift()
    );
    Ok(DhzBackend {
        client,
        key_state,
        listener: Some(listener),
    })
}

/// One polling round; unanswered buttons keep their last state.
fn poll_buttons(client: &DhzClient, state: &SharedInputState) {
    for button in MouseButton::ALL {
        if let Ok(pressed) = client.query_bool(&dhz::button_query(button), QUERY_TIMEOUT, 0) {
            state.set_button(button, pressed);
        }
    }
}

/// Symbolic token for `key`, or its decimal HID code.
fn key_token(key: &KeyRef) -> Option<String> {
    let token = KeyMapper::to_symbolic_token(key).or_else(|| KeyMapper::to_hid(key).map(|hid| hid.to_string()));
    if token.is_none() {
        debug!("DHZ: cannot resolve key {key}");
    }
    token
}

impl DhzBackend {
    fn send(&self, command: &str) -> Result<(), DeviceError> {
        self.client.send(command).map_err(DeviceError::Io)
    }
}

impl Backend for DhzBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dhz
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        self.send(&dhz::move_cmd(dx, dy))
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        self.send(&dhz::button_cmd(button, pressed))
    }

    fn wheel(&mut self, delta: i32) -> Result<(), DeviceError> {
        self.send(&dhz::wheel_cmd(delta))
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match key_token(key) {
            Some(token) => self.send(&dhz::key_down_cmd(&token)),
            None => Ok(()),
        }
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match key_token(key) {
            Some(token) => self.send(&dhz::key_up_cmd(&token)),
            None => Ok(()),
        }
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        Some(Arc::clone(&self.key_state) as Arc<dyn StateReader>)
    }

    fn mask_key(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match key_token(key) {
            Some(token) => self.send(&dhz::mask_key_cmd(&token)),
            None => Ok(()),
        }
    }

    fn unmask_key(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match key_token(key) {
            Some(token) => self.send(&dhz::unmask_key_cmd(&token)),
            None => Ok(()),
        }
    }

    fn unmask_all_keys(&mut self) -> Result<(), DeviceError> {
        self.send(dhz::UNMASK_ALL_CMD)
    }

    fn disconnect(&mut self) {
        let Some(mut listener) = self.listener.take() else {
            return;
        };
        listener.stop();
        if let Err(e) = self.client.send(dhz::MONITOR_OFF_CMD) {
            debug!("DHZ monitor(0) failed: {e}");
        }
        info!("DHZ disconnected from {}", self.client.addr());
    }
}

impl Drop for DhzBackend {
    fn drop(&mut self) {
        self.disconnect();
    }
}
