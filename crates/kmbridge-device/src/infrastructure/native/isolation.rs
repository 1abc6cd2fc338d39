//! Isolated kmNet init probe.
//!
//! Some kmNet builds block forever inside `init` when the box is unreachable
//! or the UUID is wrong.  Before calling `init` in-process the backend runs
//! it once in a child process (the `kmbridge probe-kmnet` sub-command) with a
//! hard deadline, and kills the child if it overruns.
//!
//! The child prints a single `init=<code>` line on success or
//! `error=<message>` when the module cannot be loaded.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::NativeLoader;
use crate::application::backend::DeviceError;

/// Deadline for the child process.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(3);

/// Sub-command the binary dispatches to [`run_probe_kmnet`].
pub const PROBE_SUBCOMMAND: &str = "probe-kmnet";

/// Runs kmNet `init` somewhere it cannot hang the caller.
#[cfg_attr(test, mockall::automock)]
pub trait InitIsolation: Send + Sync {
    /// # Errors
    ///
    /// [`DeviceError::Timeout`] when the deadline passes and
    /// [`DeviceError::HandshakeFailed`] when init returns non-zero or the
    /// probe cannot run.
    fn probe_kmnet(&self, library: &str, ip: &str, port: &str, uuid: &str) -> Result<(), DeviceError>;
}

/// Spawns `program [prefix_args..] probe-kmnet <library> <ip> <port> <uuid>`.
#[derive(Debug, Clone)]
pub struct ChildProcessProbe {
    program: PathBuf,
    prefix_args: Vec<String>,
    deadline: Duration,
}

impl ChildProcessProbe {
    pub fn new(program: impl Into<PathBuf>, prefix_args: Vec<String>, deadline: Duration) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            deadline,
        }
    }

    /// Probe that re-runs the current executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, Vec::new(), PROBE_DEADLINE))
    }
}

impl InitIsolation for ChildProcessProbe {
    fn probe_kmnet(&self, library: &str, ip: &str, port: &str, uuid: &str) -> Result<(), DeviceError> {
        let mut child = Command::new(&self.program)
            .args(&self.prefix_args)
            .args([PROBE_SUBCOMMAND, library, ip, port, uuid])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DeviceError::HandshakeFailed(format!("kmNet.init probe failed to start: {e}")))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if started.elapsed() >= self.deadline => {
                    if let Err(e) = child.kill() {
                        warn!("kmNet probe kill failed: {e}");
                    }
                    let _ = child.wait();
                    return Err(DeviceError::Timeout(format!(
                        "kmNet.init timeout ({:.1}s)",
                        self.deadline.as_secs_f64()
                    )));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                Err(e) => return Err(DeviceError::Io(e)),
            }
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("kmNet probe output: {}", stdout.trim());
        match parse_probe_output(&stdout) {
            Some(Ok(0)) => Ok(()),
            Some(Ok(code)) => Err(DeviceError::HandshakeFailed(format!(
                "kmNet.init probe failed (code={code})"
            ))),
            Some(Err(message)) => Err(DeviceError::HandshakeFailed(message)),
            None => Err(DeviceError::HandshakeFailed(
                "kmNet.init probe returned no result".to_string(),
            )),
        }
    }
}

/// Reads the child's result line.
///
/// `Some(Ok(code))` for `init=<code>`, `Some(Err(msg))` for `error=<msg>`,
/// `None` when neither line is present.
pub fn parse_probe_output(stdout: &str) -> Option<Result<i32, String>> {
    stdout.lines().map(str::trim).find_map(|line| {
        if let Some(code) = line.strip_prefix("init=") {
            return code.trim().parse().ok().map(Ok);
        }
        line.strip_prefix("error=").map(|msg| Err(msg.to_string()))
    })
}

/// Body of the `probe-kmnet` sub-command: loads the module, calls init and
/// returns the line to print.
pub fn run_probe_kmnet(loader: &dyn NativeLoader, library: &str, ip: &str, port: &str, uuid: &str) -> String {
    match loader.load_kmnet(library) {
        Ok(module) => format!("init={}", module.init(ip, port, uuid)),
        Err(e) => format!("error={e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::native::{MockKmNetApi, MockNativeLoader};
    use std::sync::Arc;

    #[test]
    fn test_parse_probe_output_lines() {
        assert_eq!(parse_probe_output("init=0\n"), Some(Ok(0)));
        assert_eq!(parse_probe_output("noise\n  init=-3  \n"), Some(Ok(-3)));
        assert_eq!(
            parse_probe_output("error=cannot load kmNet.dll\n"),
            Some(Err("cannot load kmNet.dll".to_string()))
        );
        assert_eq!(parse_probe_output(""), None);
    }

    #[test]
    fn test_run_probe_reports_init_code() {
        // Arrange
        let mut loader = MockNativeLoader::new();
        loader.expect_load_kmnet().returning(|_| {
            let mut api = MockKmNetApi::new();
            api.expect_init()
                .withf(|ip, port, uuid| ip == "10.0.0.2" && port == "6234" && uuid == "abcd")
                .return_const(7);
            Ok(Arc::new(api))
        });

        // Act
        let line = run_probe_kmnet(&loader, "kmNet.dll", "10.0.0.2", "6234", "abcd");

        // Assert
        assert_eq!(line, "init=7");
    }

    #[cfg(unix)]
    fn shell(script: &str, deadline: Duration) -> ChildProcessProbe {
        // `sh -c <script> <$0> ...` so the appended probe arguments are ignored.
        ChildProcessProbe::new("sh", vec!["-c".to_string(), script.to_string()], deadline)
    }

    #[cfg(unix)]
    #[test]
    fn test_child_reporting_zero_passes() {
        let probe = shell("echo init=0", Duration::from_secs(3));
        assert!(probe.probe_kmnet("kmNet.dll", "1.2.3.4", "6234", "u").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_child_reporting_failure_code() {
        let probe = shell("echo init=5", Duration::from_secs(3));
        let err = probe.probe_kmnet("kmNet.dll", "1.2.3.4", "6234", "u").err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("kmNet.init probe failed (code=5)"));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_child_is_killed_at_deadline() {
        // Arrange
        let probe = shell("sleep 10", Duration::from_millis(200));
        let started = Instant::now();

        // Act
        let result = probe.probe_kmnet("kmNet.dll", "1.2.3.4", "6234", "u");

        // Assert
        let err = result.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("kmNet.init timeout (0.2s)"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
