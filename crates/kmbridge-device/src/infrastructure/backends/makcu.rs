//! MAKCU discovery and connect.
//!
//! Ports come from the manual setting or from the supported-adapter list.
//! Ports identified as a MAKCU (or named manually) must answer
//! `km.version()` with the `MAKCU` marker; plain CH34x / CP210x bridges have
//! no version command, so they are accepted once a `km.buttons(1)` write
//! succeeds.

use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::protocol::km_text::{self, KmCommand};
use kmbridge_core::BackendKind;
use tracing::{error, info};

use super::km_text::{KmTextBackend, PROBE_TIMEOUT};
use super::serial_session::{version_handshake, SerialSession, RUN_TIMEOUT};
use crate::application::backend::{DeviceError, SharedInputState};
use crate::application::settings::SerialSettings;
use crate::infrastructure::prober::{probe_candidates, supported_ports, Candidate, ProbeTiming, MANUAL_LABEL};
use crate::infrastructure::transport::{PortEnumerator, SerialOpener};

/// Baud rates tried, fastest first.
pub const BAUD_RATES: [u32; 3] = [4_000_000, 2_000_000, 115_200];

/// Probes and connects a MAKCU.
///
/// # Errors
///
/// - [`DeviceError::PortNotFound`] when no supported adapter is present.
/// - [`DeviceError::HandshakeFailed`] when no candidate answered.
pub fn connect(
    settings: &SerialSettings,
    opener: Arc<dyn SerialOpener>,
    ports: &dyn PortEnumerator,
    state: Arc<SharedInputState>,
    timing: ProbeTiming,
) -> Result<KmTextBackend, DeviceError> {
    let manual = settings.manual_port();
    let candidates = match manual {
        Some(port) => vec![Candidate::manual(port)],
        None => supported_ports(&ports.list_ports()),
    };
    if candidates.is_empty() {
        let msg = "No supported serial devices found.".to_string();
        error!("{msg}");
        return Err(DeviceError::PortNotFound(msg));
    }

    let session = probe_candidates("MAKCU", &candidates, &BAUD_RATES, |candidate, baud| {
        open_candidate(opener.as_ref(), candidate, baud, timing)
    });

    match session {
        Some(session) => {
            info!("Connected to {} at {} baud.", session.port(), session.baud());
            KmTextBackend::start(BackendKind::Serial, session, state, opener, timing)
        }
        None => {
            let msg = match manual {
                Some(port) => format!("Could not connect to manual serial port: {port}."),
                None => "Could not connect to any supported serial device.".to_string(),
            };
            error!("{msg}");
            Err(DeviceError::HandshakeFailed(msg))
        }
    }
}

fn open_candidate(
    opener: &dyn SerialOpener,
    candidate: &Candidate,
    baud: u32,
    timing: ProbeTiming,
) -> Result<SerialSession, String> {
    let needs_version = candidate.label == "MAKCU" || candidate.label == MANUAL_LABEL;
    let mut probe = opener
        .open(&candidate.port, baud, if needs_version { PROBE_TIMEOUT } else { RUN_TIMEOUT })
        .map_err(|e| e.to_string())?;

    if needs_version {
        timing.pause(Duration::from_millis(100));
        version_handshake(
            probe.as_mut(),
            timing,
            &KmCommand::Version.encode(),
            Duration::from_millis(100),
            PROBE_TIMEOUT,
            km_text::is_makcu_version_reply,
        )?;
    } else {
        probe
            .write_all(&KmCommand::Buttons(true).encode())
            .map_err(|e| e.to_string())?;
    }
    drop(probe);
    timing.pause(Duration::from_millis(100));

    let link = opener
        .open(&candidate.port, baud, RUN_TIMEOUT)
        .map_err(|e| e.to_string())?;
    Ok(SerialSession::new(link, &candidate.port))
}
