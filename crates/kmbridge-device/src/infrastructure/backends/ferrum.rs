//! Ferrum serial backend.
//!
//! Ferrum devices accept a connection without a handshake.  The port carries
//! two interleaved streams: pushed button status bytes and the text replies
//! to our commands.  The listener owns all reads; a key-state query parks a
//! [`PendingQuery`] that the listener fills in as reply text arrives.
//!
//! Writes go through one shared handle used by both the backend and its
//! [`FerrumKeyState`] reader.  The handle lock is held only for a single
//! write, so a query waiting for its reply never blocks output.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kmbridge_core::protocol::ferrum;
use kmbridge_core::{BackendKind, KeyMapper, KeyRef, MouseButton};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::serial_session::{SerialSession, RUN_TIMEOUT};
use crate::application::backend::{Backend, DeviceError, SharedInputState, StateReader};
use crate::application::settings::FerrumSettings;
use crate::infrastructure::listener::ListenerStep;
use crate::infrastructure::prober::{adapters_first, probe_candidates, Candidate, ProbeTiming};
use crate::infrastructure::transport::{is_closed, PortEnumerator, SerialLink, SerialOpener};

pub const BAUD_RATES: [u32; 4] = [115_200, 9_600, 38_400, 57_600];

/// How long a key-state query waits for its reply.
pub const KEY_QUERY_TIMEOUT: Duration = Duration::from_millis(200);

/// A key-state query waiting for its reply.
#[derive(Debug, Default)]
struct PendingQuery {
    command: String,
    reply: String,
    answer: Option<Option<bool>>,
}

type QuerySlot = Arc<Mutex<Option<PendingQuery>>>;

pub struct FerrumBackend {
    session: SerialSession,
    link: Arc<FerrumKeyState>,
    blocked: BTreeSet<u32>,
}

/// Shared write handle plus the key-query machinery.
pub struct FerrumKeyState {
    writer: Mutex<Option<Box<dyn SerialLink>>>,
    port: String,
    query: QuerySlot,
    state: Arc<SharedInputState>,
    /// The reply slot holds one command, so queries take turns.
    in_flight: Mutex<()>,
}

/// Opens the first Ferrum port that accepts a connection.
///
/// # Errors
///
/// - [`DeviceError::PortNotFound`] when no port is configured and none exist.
/// - [`DeviceError::HandshakeFailed`] when no port could be opened.
pub fn connect(
    settings: &FerrumSettings,
    opener: Arc<dyn SerialOpener>,
    ports: &dyn PortEnumerator,
    state: Arc<SharedInputState>,
    timing: ProbeTiming,
) -> Result<FerrumBackend, DeviceError> {
    let port = settings.device_path.trim();
    let candidates = if port.is_empty() {
        adapters_first(&ports.list_ports())
    } else {
        vec![Candidate::manual(port)]
    };
    if candidates.is_empty() {
        let msg = "No serial ports found. Please specify a COM port.".to_string();
        error!("{msg}");
        return Err(DeviceError::PortNotFound(msg));
    }

    let session = probe_candidates("Ferrum", &candidates, &BAUD_RATES, |candidate, baud| {
        let mut link = opener
            .open(&candidate.port, baud, RUN_TIMEOUT)
            .map_err(|e| e.to_string())?;
        timing.pause(Duration::from_millis(100));
        if let Err(e) = link.clear_all() {
            debug!("Ferrum buffer reset failed on {}: {e}", candidate.port);
        }
        Ok(SerialSession::new(link, &candidate.port))
    });

    let Some(mut session) = session else {
        let msg = if port.is_empty() {
            "Could not connect to any Ferrum device on available serial ports.".to_string()
        } else {
            format!("Could not connect to Ferrum device on {port}. Tried baud rates: {BAUD_RATES:?}")
        };
        error!("{msg}");
        return Err(DeviceError::HandshakeFailed(msg));
    };
    info!("Connected to Ferrum device on {} at {} baud.", session.port(), session.baud());

    let port = session.port().to_string();
    let writer = session
        .link_mut()
        .ok_or_else(|| DeviceError::TransportClosed(port.clone()))?
        .try_clone()?;
    let query: QuerySlot = Arc::default();
    let listener_state = Arc::clone(&state);
    let listener_query = Arc::clone(&query);
    session.start_listener("ferrum", Arc::clone(&state), move |reader| {
        stream_listener(reader, listener_state, listener_query)
    })?;
    let link = Arc::new(FerrumKeyState {
        writer: Mutex::new(Some(writer)),
        port,
        query,
        state,
        in_flight: Mutex::new(()),
    });
    Ok(FerrumBackend {
        session,
        link,
        blocked: BTreeSet::new(),
    })
}

/// Splits the port stream into status masks and query reply text.
fn stream_listener(
    mut reader: Box<dyn SerialLink>,
    state: Arc<SharedInputState>,
    query: QuerySlot,
) -> impl FnMut() -> ListenerStep + Send + 'static {
    let mut buf = [0u8; 64];
    move || {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if is_closed(&e) => {
                error!("Ferrum listener serial exception: {e}");
                return ListenerStep::Stop;
            }
            Err(e) => {
                warn!("Ferrum listener error: {e}");
                std::thread::sleep(Duration::from_millis(1));
                return ListenerStep::Continue;
            }
        };
        if n == 0 {
            return ListenerStep::Continue;
        }

        let mut text = String::new();
        for &byte in &buf[..n] {
            match ferrum::status_mask(byte) {
                Some(mask) => {
                    state.apply_mask(mask);
                }
                None => text.push(char::from(byte)),
            }
        }
        if let Some(pending) = query.lock().as_mut() {
            if pending.answer.is_none() {
                pending.reply.push_str(&text);
                if ferrum::is_reply_complete(&pending.reply, &pending.command) {
                    pending.answer = Some(ferrum::parse_key_state_reply(&pending.reply, &pending.command));
                }
            }
        }
        ListenerStep::Continue
    }
}

impl FerrumKeyState {
    fn send(&self, command: &str) -> Result<(), DeviceError> {
        let mut writer = self.writer.lock();
        let link = writer
            .as_mut()
            .ok_or_else(|| DeviceError::TransportClosed(self.port.clone()))?;
        link.write_all(&ferrum::encode(command))?;
        Ok(())
    }

    /// Drops the write handle; later queries answer from the cache.
    fn close(&self) {
        *self.writer.lock() = None;
        *self.query.lock() = None;
    }

    fn wait_for_answer(&self, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut slot = self.query.lock();
                if let Some(answer) = slot.as_ref().and_then(|q| q.answer) {
                    *slot = None;
                    return answer;
                }
            }
            if Instant::now() >= deadline {
                *self.query.lock() = None;
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl StateReader for FerrumKeyState {
    /// Asks the device, falling back to the last known answer.
    fn is_key_pressed(&self, key: &KeyRef) -> bool {
        let Some(hid) = KeyMapper::to_hid(key) else {
            return false;
        };
        let _turn = self.in_flight.lock();
        let command = ferrum::key_query_cmd(hid);
        *self.query.lock() = Some(PendingQuery {
            command: command.clone(),
            ..PendingQuery::default()
        });
        if let Err(e) = self.send(&command) {
            debug!("Ferrum key query failed: {e}");
            *self.query.lock() = None;
            return self.state.key(hid).unwrap_or(false);
        }
        match self.wait_for_answer(KEY_QUERY_TIMEOUT) {
            Some(pressed) => {
                self.state.set_key(hid, pressed);
                pressed
            }
            None => self.state.key(hid).unwrap_or(false),
        }
    }
}

impl FerrumBackend {
    fn send(&mut self, command: &str) -> Result<(), DeviceError> {
        self.link.send(command)
    }

    fn hid(key: &KeyRef) -> Option<u32> {
        let hid = KeyMapper::to_hid(key);
        if hid.is_none() {
            debug!("Ferrum: cannot resolve key {key}");
        }
        hid
    }
}

impl Backend for FerrumBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ferrum
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        self.send(&ferrum::move_cmd(dx, dy))
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), DeviceError> {
        self.send(&ferrum::button_cmd(button, pressed))
    }

    fn key_down(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::hid(key) {
            Some(hid) => self.send(&ferrum::key_down_cmd(hid)),
            None => Ok(()),
        }
    }

    fn key_up(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::hid(key) {
            Some(hid) => self.send(&ferrum::key_up_cmd(hid)),
            None => Ok(()),
        }
    }

    fn key_press(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        match Self::hid(key) {
            Some(hid) => self.send(&ferrum::key_click_cmd(hid)),
            None => Ok(()),
        }
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        Some(Arc::clone(&self.link) as Arc<dyn StateReader>)
    }

    fn mask_key(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(hid) = Self::hid(key) else {
            return Ok(());
        };
        self.send(&ferrum::key_block_cmd(hid, true))?;
        self.blocked.insert(hid);
        Ok(())
    }

    fn unmask_key(&mut self, key: &KeyRef) -> Result<(), DeviceError> {
        let Some(hid) = Self::hid(key) else {
            return Ok(());
        };
        self.blocked.remove(&hid);
        self.send(&ferrum::key_block_cmd(hid, false))
    }

    fn unmask_all_keys(&mut self) -> Result<(), DeviceError> {
        let blocked = std::mem::take(&mut self.blocked);
        for hid in blocked {
            self.send(&ferrum::key_block_cmd(hid, false))?;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.session.is_open() {
            info!("Ferrum disconnected from {}", self.session.port());
        }
        self.link.close();
        self.session.close();
        self.blocked.clear();
    }
}
