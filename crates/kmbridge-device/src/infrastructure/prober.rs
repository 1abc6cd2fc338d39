//! Serial port discovery and handshake helpers shared by the serial backends.
//!
//! # How a serial connect works (for beginners)
//!
//! 1. Build the candidate port list: either the one port the user named, or
//!    the system ports filtered or ranked by how much they look like the
//!    target device ([`supported_ports`], [`rank_ports`]).
//! 2. Build the baud list, fastest first ([`fixed_or_default_bauds`],
//!    [`preferred_then_default_bauds`]).
//! 3. Walk every `port × baud` pair with [`probe_candidates`], running the
//!    backend's handshake on each until one succeeds.
//!
//! The handshake itself lives in each backend because every firmware
//! answers differently.  [`read_window`] is the common "collect the reply
//! for a while" step.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::transport::{PortInfo, SerialLink};

/// Known USB-serial adapters: `(VID:PID, name)`.
pub const SUPPORTED_ADAPTERS: [(&str, &str); 5] = [
    ("1A86:55D3", "MAKCU"),
    ("1A86:5523", "CH343"),
    ("1A86:7523", "CH340"),
    ("1A86:5740", "CH347"),
    ("10C4:EA60", "CP2102"),
];

/// Label given to a port the user named explicitly.
pub const MANUAL_LABEL: &str = "MANUAL";

/// A port to probe and the adapter name it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub port: String,
    pub label: String,
}

impl Candidate {
    pub fn new(port: &str, label: &str) -> Self {
        Self {
            port: port.to_string(),
            label: label.to_string(),
        }
    }

    pub fn manual(port: &str) -> Self {
        Self::new(port, MANUAL_LABEL)
    }
}

/// Ports whose hardware id contains a known VID:PID or whose description
/// names a known adapter, labelled with the first adapter they match.
pub fn supported_ports(ports: &[PortInfo]) -> Vec<Candidate> {
    ports
        .iter()
        .filter_map(|port| adapter_label(port).map(|label| Candidate::new(&port.name, label)))
        .collect()
}

/// Name of the first supported adapter `port` matches, if any.
pub fn adapter_label(port: &PortInfo) -> Option<&'static str> {
    let hwid = port.hwid.to_ascii_uppercase();
    let description = port.description.to_ascii_uppercase();
    SUPPORTED_ADAPTERS
        .iter()
        .find(|(vid_pid, name)| hwid.contains(vid_pid) || description.contains(name))
        .map(|(_, name)| *name)
}

/// Number of `hints` found in the port's name, description and hardware id.
pub fn score_port(port: &PortInfo, hints: &[&str]) -> usize {
    let text = format!("{} {} {}", port.name, port.description, port.hwid).to_ascii_uppercase();
    hints.iter().filter(|hint| text.contains(*hint)).count()
}

/// Every port, best score first.  Ties keep enumeration order.
pub fn rank_ports(ports: &[PortInfo], hints: &[&str]) -> Vec<String> {
    let mut scored: Vec<(usize, &PortInfo)> = ports.iter().map(|p| (score_port(p, hints), p)).collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, p)| p.name.clone()).collect()
}

/// Supported adapters first, then every other port.
pub fn adapters_first(ports: &[PortInfo]) -> Vec<Candidate> {
    let (supported, others): (Vec<&PortInfo>, Vec<&PortInfo>) =
        ports.iter().partition(|p| adapter_label(p).is_some());
    supported
        .into_iter()
        .map(|p| Candidate::new(&p.name, adapter_label(p).unwrap_or("Unknown")))
        .chain(others.into_iter().map(|p| Candidate::new(&p.name, "Unknown")))
        .collect()
}

/// `[configured]` when a baud is configured, otherwise the default list.
pub fn fixed_or_default_bauds(configured: u32, defaults: &[u32]) -> Vec<u32> {
    if configured > 0 {
        vec![configured]
    } else {
        defaults.to_vec()
    }
}

/// The configured baud followed by the defaults, without duplicates.
pub fn preferred_then_default_bauds(configured: u32, defaults: &[u32]) -> Vec<u32> {
    let mut bauds = Vec::with_capacity(defaults.len() + 1);
    if configured > 0 {
        bauds.push(configured);
    }
    for &baud in defaults {
        if !bauds.contains(&baud) {
            bauds.push(baud);
        }
    }
    bauds
}

/// Runs `attempt` on every `port × baud` pair until one succeeds.
///
/// Each failure is logged at `warn` with its reason.
pub fn probe_candidates<T>(
    backend: &str,
    candidates: &[Candidate],
    bauds: &[u32],
    mut attempt: impl FnMut(&Candidate, u32) -> Result<T, String>,
) -> Option<T> {
    for candidate in candidates {
        for &baud in bauds {
            debug!("Probing {backend} on {} ({}) @ {baud}", candidate.port, candidate.label);
            match attempt(candidate, baud) {
                Ok(found) => return Some(found),
                Err(reason) => warn!("{backend} failed on {}@{baud}: {reason}", candidate.port),
            }
        }
    }
    None
}

/// Reads from `link` until `accept` approves the collected bytes or
/// `window` elapses.  At least one read is always made.
pub fn read_window(link: &mut dyn SerialLink, window: Duration, accept: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    let deadline = Instant::now() + window;
    let mut collected = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        match link.read(&mut buf) {
            Ok(n) if n > 0 => {
                collected.extend_from_slice(&buf[..n]);
                if accept(&collected) {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Read during handshake failed: {e}");
                break;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
    }
    collected
}

/// Scales the fixed handshake pauses.
///
/// Production code uses [`ProbeTiming::REAL`].  Tests shrink the pauses so
/// probing many candidates stays fast; port read timeouts are unaffected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeTiming {
    scale: f64,
}

impl ProbeTiming {
    pub const REAL: Self = Self { scale: 1.0 };

    pub fn scaled(scale: f64) -> Self {
        Self { scale: scale.max(0.0) }
    }

    pub fn duration(&self, base: Duration) -> Duration {
        base.mul_f64(self.scale)
    }

    /// Sleeps for the scaled `base`.
    pub fn pause(&self, base: Duration) {
        let scaled = self.duration(base);
        if !scaled.is_zero() {
            std::thread::sleep(scaled);
        }
    }
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self::REAL
    }
}
