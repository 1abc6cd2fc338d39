//! The nine device backends and the factory that connects them.
//!
//! | Module          | Kind(s)        | Transport                       |
//! |-----------------|----------------|---------------------------------|
//! | `makcu`         | Serial         | USB serial, `km.` text          |
//! | `makv2`         | MakV2          | USB serial, `km.` text          |
//! | `makv2_binary`  | MakV2Binary    | USB serial, `0x50` frames       |
//! | `arduino`       | Arduino        | USB serial, one-letter lines    |
//! | `ferrum`        | Ferrum         | USB serial, Ferrum text         |
//! | `dhz`           | Dhz            | UDP, rotated text               |
//! | `kmnet`         | Net            | vendor DLL                      |
//! | `kmboxa`        | KmboxA         | vendor DLL                      |
//! | `send_input`    | SendInput      | Windows input queue             |
//!
//! `km_text` holds the backend shared by MAKCU and MakV2; `serial_session`
//! the open-port bookkeeping shared by every serial backend.

pub mod arduino;
pub mod dhz;
pub mod ferrum;
pub mod km_text;
pub mod kmboxa;
pub mod kmnet;
pub mod makcu;
pub mod makv2;
pub mod makv2_binary;
pub mod send_input;
pub mod serial_session;

use std::sync::Arc;

use kmbridge_core::BackendKind;
use tracing::{debug, warn};

use crate::application::backend::{Backend, BackendFactory, DeviceError, SharedInputState};
use crate::application::settings::{BackendSettings, FerrumConnection};
use crate::infrastructure::native::isolation::{ChildProcessProbe, InitIsolation};
use crate::infrastructure::native::{NativeLoader, SystemLoader};
use crate::infrastructure::os_input::{self, InputInjector};
use crate::infrastructure::prober::ProbeTiming;
use crate::infrastructure::transport::{PortEnumerator, SerialOpener, SystemSerial};

/// Connects real backends.
///
/// Every OS seam is a trait object so tests can swap in fakes.
pub struct SystemBackendFactory {
    opener: Arc<dyn SerialOpener>,
    ports: Arc<dyn PortEnumerator>,
    loader: Arc<dyn NativeLoader>,
    isolation: Option<Arc<dyn InitIsolation>>,
    os_input: Option<Arc<dyn InputInjector>>,
    timing: ProbeTiming,
}

impl SystemBackendFactory {
    /// Factory wired to the real serial ports, DLL loader and OS input.
    pub fn new() -> Self {
        let isolation: Option<Arc<dyn InitIsolation>> = match ChildProcessProbe::current_exe() {
            Ok(probe) => Some(Arc::new(probe)),
            Err(e) => {
                warn!("kmNet init isolation unavailable: {e}");
                None
            }
        };
        let os_input = match os_input::system_injector() {
            Ok(injector) => Some(injector),
            Err(e) => {
                debug!("{e}");
                None
            }
        };
        Self {
            opener: Arc::new(SystemSerial),
            ports: Arc::new(SystemSerial),
            loader: Arc::new(SystemLoader),
            isolation,
            os_input,
            timing: ProbeTiming::REAL,
        }
    }

    /// Factory with every seam supplied by the caller.
    pub fn with_parts(
        opener: Arc<dyn SerialOpener>,
        ports: Arc<dyn PortEnumerator>,
        loader: Arc<dyn NativeLoader>,
        isolation: Option<Arc<dyn InitIsolation>>,
        os_input: Option<Arc<dyn InputInjector>>,
        timing: ProbeTiming,
    ) -> Self {
        Self {
            opener,
            ports,
            loader,
            isolation,
            os_input,
            timing,
        }
    }

    fn os_input(&self) -> Result<Arc<dyn InputInjector>, DeviceError> {
        self.os_input
            .clone()
            .ok_or_else(|| DeviceError::Unsupported("SendInput is only available on Windows".to_string()))
    }
}

impl Default for SystemBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for SystemBackendFactory {
    fn connect(
        &self,
        kind: BackendKind,
        settings: &BackendSettings,
        state: Arc<SharedInputState>,
    ) -> Result<Box<dyn Backend>, DeviceError> {
        let opener = Arc::clone(&self.opener);
        let ports = self.ports.as_ref();
        let timing = self.timing;
        Ok(match kind {
            BackendKind::Serial => Box::new(makcu::connect(&settings.serial, opener, ports, state, timing)?),
            BackendKind::MakV2 => Box::new(makv2::connect(&settings.makv2, opener, ports, state, timing)?),
            BackendKind::MakV2Binary => Box::new(makv2_binary::connect(
                &settings.makv2_binary,
                opener,
                ports,
                state,
                timing,
            )?),
            BackendKind::Arduino => Box::new(arduino::connect(&settings.arduino, opener, ports, state, timing)?),
            BackendKind::Ferrum => {
                if settings.ferrum.connection_type == FerrumConnection::Auto {
                    debug!("Ferrum connection type auto resolves to serial");
                }
                Box::new(ferrum::connect(&settings.ferrum, opener, ports, state, timing)?)
            }
            BackendKind::Dhz => Box::new(dhz::connect(&settings.dhz, state)?),
            BackendKind::Net => {
                let isolation = self.isolation.as_deref().ok_or_else(|| {
                    DeviceError::Unsupported("kmNet init isolation is unavailable".to_string())
                })?;
                Box::new(kmnet::connect(&settings.kmnet, self.loader.as_ref(), isolation, state)?)
            }
            BackendKind::KmboxA => {
                state.reset();
                Box::new(kmboxa::connect(&settings.kmboxa, self.loader.as_ref(), self.os_input()?)?)
            }
            BackendKind::SendInput => {
                state.reset();
                Box::new(send_input::SendInputBackend::new(self.os_input()?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::native::MockNativeLoader;
    use crate::infrastructure::os_input::mock::MockInjector;
    use crate::infrastructure::transport::mock::{MockSerialOpener, ScriptedPort, StaticPorts};
    use crate::infrastructure::transport::PortInfo;

    fn factory(ports: Vec<PortInfo>, opener: Arc<MockSerialOpener>, os_input: Option<Arc<dyn InputInjector>>) -> SystemBackendFactory {
        SystemBackendFactory::with_parts(
            opener,
            Arc::new(StaticPorts(ports)),
            Arc::new(MockNativeLoader::new()),
            None,
            os_input,
            ProbeTiming::scaled(0.0),
        )
    }

    #[test]
    fn test_dispatches_serial_kind_to_makcu_probe() {
        // Arrange
        let device = ScriptedPort::new();
        device.respond_to(b"km.version()\r", b"MAKCU\r\n");
        let opener = Arc::new(MockSerialOpener::new());
        opener.add("COM3", 4_000_000, device);
        let factory = factory(
            vec![PortInfo::usb("COM3", 0x1A86, 0x55D3, "USB-Enhanced-SERIAL")],
            opener,
            None,
        );

        // Act
        let backend = factory.connect(
            BackendKind::Serial,
            &BackendSettings::default(),
            Arc::new(SharedInputState::new()),
        );

        // Assert
        let mut backend = backend.ok().unwrap();
        assert_eq!(backend.kind(), BackendKind::Serial);
        backend.disconnect();
    }

    #[test]
    fn test_send_input_without_os_support_is_unsupported() {
        let factory = factory(Vec::new(), Arc::new(MockSerialOpener::new()), None);
        let result = factory.connect(
            BackendKind::SendInput,
            &BackendSettings::default(),
            Arc::new(SharedInputState::new()),
        );
        assert!(matches!(result, Err(DeviceError::Unsupported(_))));
    }

    #[test]
    fn test_send_input_with_injector_connects() {
        let factory = factory(
            Vec::new(),
            Arc::new(MockSerialOpener::new()),
            Some(Arc::new(MockInjector::new())),
        );
        let result = factory.connect(
            BackendKind::SendInput,
            &BackendSettings::default(),
            Arc::new(SharedInputState::new()),
        );
        assert_eq!(result.ok().map(|b| b.kind()), Some(BackendKind::SendInput));
    }

    #[test]
    fn test_kmnet_without_isolation_is_unsupported() {
        let factory = factory(Vec::new(), Arc::new(MockSerialOpener::new()), None);
        let result = factory.connect(BackendKind::Net, &BackendSettings::default(), Arc::new(SharedInputState::new()));
        assert!(matches!(result, Err(DeviceError::Unsupported(_))));
    }
}
