//! kmbridge: headless device host.
//!
//! Connects the configured mouse/keyboard backend and keeps its hardware
//! locks and button masks up to date until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! kmbridge [--config <PATH>] [--backend <NAME>] [run]
//! kmbridge ports
//! ```
//!
//! `run` is the default.  `ports` lists the serial ports with the adapter
//! they match and their MakV2 / Arduino hint scores, which helps when picking
//! a manual port.
//!
//! A hidden `probe-kmnet <library> <ip> <port> <uuid>` sub-command is the
//! child side of the isolated kmNet init probe: it prints one `init=<code>`
//! or `error=<message>` line and exits.
//!
//! # Architecture overview
//!
//! ```text
//! main()
//!  └─ load kmbridge.toml            -- HostConfig
//!  └─ DeviceManager::with_settings  -- SystemBackendFactory
//!  └─ connect (blocking pool)       -- optional 4 Mbaud upgrade
//!  └─ 60 Hz tick loop               -- movement lock + button mask (blocking pool)
//!  └─ Ctrl-C ─► cleanup             -- unlock, release masks, disconnect
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kmbridge_core::BackendKind;
use kmbridge_device::application::device_manager::DeviceManager;
use kmbridge_device::application::settings::BackendSettings;
use kmbridge_device::infrastructure::backends::{arduino, makv2, SystemBackendFactory};
use kmbridge_device::infrastructure::native::isolation::run_probe_kmnet;
use kmbridge_device::infrastructure::native::SystemLoader;
use kmbridge_device::infrastructure::prober::{adapter_label, score_port};
use kmbridge_device::infrastructure::storage::config::{load_config, load_config_from, HostConfig};
use kmbridge_device::infrastructure::transport::{PortEnumerator, PortInfo, SystemSerial};

/// Host tick period (60 Hz).
const TICK_PERIOD: Duration = Duration::from_micros(16_667);

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "kmbridge", about = "Mouse and keyboard device host", version)]
struct Cli {
    /// Path of kmbridge.toml; defaults to the platform config directory.
    #[arg(long, short, env = "KMBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend name overriding `[device] backend`.
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Connect and run until Ctrl-C (default).
    Run,
    /// List serial ports with adapter match and hint scores.
    Ports,
    /// Isolated kmNet init, spawned by the kmNet backend.
    #[command(hide = true, name = "probe-kmnet")]
    ProbeKmnet {
        library: String,
        ip: String,
        port: String,
        #[arg(default_value = "")]
        uuid: String,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        if let Some(backend) = &self.backend {
            config.device.backend = backend.clone();
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Stdout belongs to the parent process here, so no logging.
        Some(Command::ProbeKmnet { ref library, ref ip, ref port, ref uuid }) => {
            println!("{}", run_probe_kmnet(&SystemLoader, library, ip, port, uuid));
            Ok(())
        }
        Some(Command::Ports) => {
            init_logging("warn");
            for line in port_report(&SystemSerial.list_ports()) {
                println!("{line}");
            }
            Ok(())
        }
        Some(Command::Run) | None => {
            let config = cli.load_config()?;
            init_logging(&config.device.log_level);
            run(config).await
        }
    }
}

/// Installs the fmt subscriber; `RUST_LOG` wins over `default_level`.
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

async fn run(config: HostConfig) -> anyhow::Result<()> {
    let kind = config.device.backend_kind();
    info!("kmbridge starting (backend {kind})");

    let manager = Arc::new(DeviceManager::with_settings(
        Arc::new(SystemBackendFactory::new()),
        config.backends.clone(),
    ));
    manager.set_movement_lock_config(config.movement_lock);
    manager.set_button_mask_config(config.button_mask);

    if config.device.auto_connect {
        let connect_manager = Arc::clone(&manager);
        let settings = config.backends.clone();
        let auto_4m = config.device.serial_auto_switch_4m;
        tokio::task::spawn_blocking(move || connect_backend(&connect_manager, kind, &settings, auto_4m))
            .await
            .context("connect task panicked")?;
    } else {
        info!("auto_connect is off; not connecting");
    }

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    info!("kmbridge ready.  Press Ctrl-C to exit.");

    // ── Tick loop ──────────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        run_tick(Arc::clone(&manager)).await?;
    }

    let cleanup_manager = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || cleanup_manager.cleanup())
        .await
        .context("cleanup task panicked")?;

    info!("kmbridge stopped");
    Ok(())
}

/// One host tick on the blocking pool; lock and mask commands are serial writes.
async fn run_tick(manager: Arc<DeviceManager>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || host_tick(&manager))
        .await
        .context("tick task panicked")
}

fn host_tick(manager: &DeviceManager) {
    manager.tick_movement_lock();
    // With no aim loop attached the `[button_mask] enabled` flag decides.
    manager.button_mask_tick(true);
}

fn connect_backend(
    manager: &DeviceManager,
    kind: BackendKind,
    settings: &BackendSettings,
    auto_4m: bool,
) {
    if let Err(e) = manager.connect(kind, settings) {
        error!("Could not connect {kind}: {e}");
        return;
    }
    if kind == BackendKind::Serial && auto_4m {
        match manager.switch_to_4m() {
            Ok(()) => info!("Serial link running at 4 Mbaud"),
            Err(e) => warn!("4 Mbaud switch failed: {e}"),
        }
    }
}

/// One line per port: name, ids, matched adapter and hint scores.
fn port_report(ports: &[PortInfo]) -> Vec<String> {
    if ports.is_empty() {
        return vec!["No serial ports found.".to_string()];
    }
    ports
        .iter()
        .map(|port| {
            let ids = match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => format!("{vid:04X}:{pid:04X}"),
                _ => "----:----".to_string(),
            };
            format!(
                "{:<16} {ids}  {:<8} makv2={} arduino={}  {}",
                port.name,
                adapter_label(port).unwrap_or("-"),
                score_port(port, &makv2::PORT_HINTS),
                score_port(port, &arduino::PORT_HINTS),
                port.description,
            )
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kmbridge_core::{AxisLockConfig, Channel};
    use kmbridge_device::infrastructure::native::isolation::PROBE_SUBCOMMAND;
    use kmbridge_device::infrastructure::prober::ProbeTiming;
    use kmbridge_device::infrastructure::transport::mock::{MockSerialOpener, ScriptedPort, StaticPorts};

    #[test]
    fn test_cli_without_subcommand_runs() {
        let cli = Cli::parse_from(["kmbridge"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.backend, None);
    }

    #[test]
    fn test_cli_backend_override_replaces_config_value() {
        // Arrange
        let path = std::env::temp_dir().join(format!("kmbridge-cli-{}-absent.toml", std::process::id()));
        let cli = Cli::parse_from([
            "kmbridge",
            "--config",
            path.to_str().unwrap(),
            "--backend",
            "dhz",
        ]);

        // Act
        let config = cli.load_config().unwrap();

        // Assert
        assert_eq!(config.device.backend_kind(), BackendKind::Dhz);
    }

    #[test]
    fn test_probe_subcommand_matches_isolation_invocation() {
        // Arrange: the exact argv the kmNet backend spawns, with an empty uuid
        let cli = Cli::parse_from(["kmbridge", PROBE_SUBCOMMAND, "kmNet.dll", "192.168.2.188", "6234", ""]);

        // Assert
        assert_eq!(
            cli.command,
            Some(Command::ProbeKmnet {
                library: "kmNet.dll".to_string(),
                ip: "192.168.2.188".to_string(),
                port: "6234".to_string(),
                uuid: String::new(),
            })
        );
    }

    #[test]
    fn test_port_report_shows_adapter_and_scores() {
        // Arrange
        let ports = vec![PortInfo::usb("COM3", 0x1A86, 0x7523, "USB-SERIAL CH340")];

        // Act
        let lines = port_report(&ports);

        // Assert
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("COM3"));
        assert!(lines[0].contains("1A86:7523"));
        assert!(lines[0].contains("CH340"));
        assert!(lines[0].contains("makv2=3"));
        assert!(lines[0].contains("arduino=1"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_tick_sends_lock_commands_from_the_blocking_pool() {
        // Arrange
        let device = ScriptedPort::new();
        device.respond_to(b"km.version()\r", b"km.version()\r\nMAKCU\r\n>>> ");
        let opener = Arc::new(MockSerialOpener::new());
        opener.add("COM3", 4_000_000, device.clone());
        let factory = SystemBackendFactory::with_parts(
            opener,
            Arc::new(StaticPorts(vec![PortInfo::usb("COM3", 0x1A86, 0x55D3, "USB-Enhanced-SERIAL")])),
            Arc::new(SystemLoader),
            None,
            None,
            ProbeTiming::scaled(0.0),
        );
        let manager = Arc::new(DeviceManager::new(Arc::new(factory)));
        manager.connect(BackendKind::Serial, &BackendSettings::default()).unwrap();
        manager.set_movement_lock_config(AxisLockConfig {
            main_x: true,
            ..AxisLockConfig::default()
        });
        manager.update_movement_lock(true, false, Channel::Main);
        device.clear_written();

        // Act
        run_tick(Arc::clone(&manager)).await.unwrap();

        // Assert
        assert_eq!(device.written_text(), "km.lock_mx(1)\r");
        manager.disconnect_all();
    }

    #[test]
    fn test_port_report_without_ports() {
        assert_eq!(port_report(&[]), vec!["No serial ports found.".to_string()]);
    }
}
