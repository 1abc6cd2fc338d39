//! MakV2 (text firmware) discovery and connect.
//!
//! Without a configured port every system port is tried, best hint score
//! first.  MakV2 firmware revisions answer `km.version()` with assorted
//! banners, and some with bare bytes, so any reply counts as a handshake.

use std::sync::Arc;
use std::time::Duration;

use kmbridge_core::protocol::km_text::{self, KmCommand};
use kmbridge_core::BackendKind;
use tracing::{debug, error, info};

use super::km_text::KmTextBackend;
use super::serial_session::{version_handshake, SerialSession, RUN_TIMEOUT};
use crate::application::backend::{DeviceError, SharedInputState};
use crate::application::settings::MakV2Settings;
use crate::infrastructure::prober::{fixed_or_default_bauds, probe_candidates, rank_ports, Candidate, ProbeTiming};
use crate::infrastructure::transport::{PortEnumerator, SerialOpener};

pub const BAUD_RATES: [u32; 4] = [4_000_000, 2_000_000, 1_000_000, 115_200];

pub const PORT_HINTS: [&str; 7] = ["MAK", "MAKXD", "V2", "CH343", "CH340", "USB", "SERIAL"];

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Probes and connects a MakV2 text device.
///
/// # Errors
///
/// - [`DeviceError::PortNotFound`] when the system has no serial ports.
/// - [`DeviceError::HandshakeFailed`] when nothing answered.
pub fn connect(
    settings: &MakV2Settings,
    opener: Arc<dyn SerialOpener>,
    ports: &dyn PortEnumerator,
    state: Arc<SharedInputState>,
    timing: ProbeTiming,
) -> Result<KmTextBackend, DeviceError> {
    let port = settings.port.trim();
    let candidates: Vec<Candidate> = if port.is_empty() {
        rank_ports(&ports.list_ports(), &PORT_HINTS)
            .iter()
            .map(|name| Candidate::new(name, "MakV2"))
            .collect()
    } else {
        vec![Candidate::manual(port)]
    };
    if candidates.is_empty() {
        let msg = "No COM port available for MakV2.".to_string();
        error!("{msg}");
        return Err(DeviceError::PortNotFound(msg));
    }

    let bauds = fixed_or_default_bauds(settings.baud, &BAUD_RATES);
    let session = probe_candidates("MakV2", &candidates, &bauds, |candidate, baud| {
        open_candidate(opener.as_ref(), candidate, baud, timing)
    });

    match session {
        Some(session) => {
            info!("Connected to MakV2 on {} at {} baud.", session.port(), session.baud());
            KmTextBackend::start(BackendKind::MakV2, session, state, opener, timing)
        }
        None => {
            let msg = "Could not connect to MakV2 device.".to_string();
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
    let mut probe = opener
        .open(&candidate.port, baud, PROBE_TIMEOUT)
        .map_err(|e| e.to_string())?;
    timing.pause(Duration::from_millis(80));
    let reply = version_handshake(
        probe.as_mut(),
        timing,
        &KmCommand::Version.encode(),
        Duration::from_millis(80),
        Duration::from_millis(350),
        |reply| !reply.is_empty(),
    );
    drop(probe);
    timing.pause(Duration::from_millis(50));
    let reply = reply?;
    if km_text::is_makv2_version_reply(&reply) {
        debug!("MakV2 banner on {}: {:?}", candidate.port, String::from_utf8_lossy(&reply));
    }

    let link = opener
        .open(&candidate.port, baud, RUN_TIMEOUT)
        .map_err(|e| e.to_string())?;
    Ok(SerialSession::new(link, &candidate.port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::Backend;
    use crate::infrastructure::transport::mock::{MockSerialOpener, ScriptedPort, StaticPorts};
    use crate::infrastructure::transport::PortInfo;

    fn port(name: &str, description: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            description: description.to_string(),
            ..PortInfo::default()
        }
    }

    #[test]
    fn test_empty_system_is_port_not_found() {
        let result = connect(
            &MakV2Settings::default(),
            Arc::new(MockSerialOpener::new()),
            &StaticPorts::default(),
            Arc::new(SharedInputState::new()),
            ProbeTiming::scaled(0.0),
        );
        let err = result.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("No COM port available for MakV2."));
    }

    #[test]
    fn test_best_scored_port_is_probed_first() {
        // Arrange
        let device = ScriptedPort::new();
        device.respond_to(b"km.version()\r", b"makxd v2\r\n");
        let opener = Arc::new(MockSerialOpener::new());
        opener.add("COM8", 4_000_000, device.clone());
        let ports = StaticPorts(vec![port("COM1", "Communications Port"), port("COM8", "MAKXD V2 USB")]);

        // Act
        let mut backend = connect(
            &MakV2Settings::default(),
            Arc::clone(&opener) as Arc<dyn SerialOpener>,
            &ports,
            Arc::new(SharedInputState::new()),
            ProbeTiming::scaled(0.0),
        )
        .unwrap();

        // Assert
        assert_eq!(opener.attempts()[0], ("COM8".to_string(), 4_000_000));
        assert_eq!(backend.kind(), BackendKind::MakV2);
        backend.disconnect();
    }

    #[test]
    fn test_configured_baud_is_the_only_one_tried() {
        // Arrange
        let opener = Arc::new(MockSerialOpener::new());
        let settings = MakV2Settings {
            port: "COM2".to_string(),
            baud: 115_200,
        };

        // Act
        let result = connect(
            &settings,
            Arc::clone(&opener) as Arc<dyn SerialOpener>,
            &StaticPorts::default(),
            Arc::new(SharedInputState::new()),
            ProbeTiming::scaled(0.0),
        );

        // Assert
        assert!(matches!(result, Err(DeviceError::HandshakeFailed(_))));
        assert_eq!(opener.attempts(), vec![("COM2".to_string(), 115_200)]);
    }

    #[test]
    fn test_any_reply_is_accepted() {
        // Arrange
        let device = ScriptedPort::new();
        device.respond_to(b"km.version()\r", b"\x00\x01");
        let opener = Arc::new(MockSerialOpener::new());
        opener.add_any_baud("COM2", device);
        let settings = MakV2Settings {
            port: "COM2".to_string(),
            baud: 0,
        };

        // Act
        let result = connect(
            &settings,
            opener,
            &StaticPorts::default(),
            Arc::new(SharedInputState::new()),
            ProbeTiming::scaled(0.0),
        );

        // Assert
        let mut backend = result.ok().unwrap();
        backend.disconnect();
    }
}
