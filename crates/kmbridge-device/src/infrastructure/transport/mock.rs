//! In-memory serial ports for tests.
//!
//! # How the script works
//!
//! A [`ScriptedPort`] is a fake device.  Tests register replies with
//! [`ScriptedPort::respond_to`]: whenever the bytes written so far end with
//! the trigger, the reply is queued for reading.  Bytes can also be pushed
//! at any time with [`ScriptedPort::push_incoming`], e.g. a status byte the
//! listener should pick up.
//!
//! Every handle opened on a port (including `try_clone` handles) shares the
//! same state, just like two handles on a real port.
//!
//! [`MockSerialOpener`] maps `(port, baud)` pairs to scripted ports and
//! records every open attempt, so tests can assert which candidates were
//! probed and in which order.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::serial::{PortEnumerator, PortInfo, SerialLink, SerialOpener};

#[derive(Default)]
struct PortState {
    written: Vec<u8>,
    incoming: VecDeque<u8>,
    replies: Vec<(Vec<u8>, Vec<u8>)>,
    input_clears: usize,
    fail_writes: bool,
    closed: bool,
}

/// A fake device that answers writes from a script.
#[derive(Clone, Default)]
pub struct ScriptedPort {
    state: Arc<Mutex<PortState>>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for reading whenever the written stream ends with `trigger`.
    pub fn respond_to(&self, trigger: &[u8], reply: &[u8]) -> &Self {
        self.state.lock().replies.push((trigger.to_vec(), reply.to_vec()));
        self
    }

    /// Makes bytes available to the next reads.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes);
    }

    /// Everything written to the port so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Everything written, as lossy text.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().written).into_owned()
    }

    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    pub fn input_clears(&self) -> usize {
        self.state.lock().input_clears
    }

    /// Makes every later write fail with `BrokenPipe`.
    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Simulates unplugging: reads and writes fail with `BrokenPipe`.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    fn link(&self, baud: u32, timeout: Duration) -> Box<dyn SerialLink> {
        Box::new(ScriptedLink {
            port: self.clone(),
            baud,
            timeout,
        })
    }
}

struct ScriptedLink {
    port: ScriptedPort,
    baud: u32,
    timeout: Duration,
}

impl SerialLink for ScriptedLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.port.state.lock();
        if state.closed || state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted port closed"));
        }
        state.written.extend_from_slice(bytes);
        let replies: Vec<Vec<u8>> = state
            .replies
            .iter()
            .filter(|(trigger, _)| state.written.ends_with(trigger))
            .map(|(_, reply)| reply.clone())
            .collect();
        for reply in replies {
            state.incoming.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.port.state.lock();
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted port closed"));
            }
            if !state.incoming.is_empty() {
                let n = buf.len().min(state.incoming.len());
                for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        // Nothing queued: behave like a port timeout, capped to keep tests fast.
        std::thread::sleep(self.timeout.min(Duration::from_millis(5)));
        Ok(0)
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.port.state.lock().incoming.len())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = self.port.state.lock();
        state.incoming.clear();
        state.input_clears += 1;
        Ok(())
    }

    fn clear_all(&mut self) -> io::Result<()> {
        self.clear_input()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(self.port.link(self.baud, self.timeout))
    }
}

/// Opens scripted ports and records every attempt.
#[derive(Default)]
pub struct MockSerialOpener {
    ports: Mutex<HashMap<(String, u32), ScriptedPort>>,
    any_baud: Mutex<HashMap<String, ScriptedPort>>,
    /// `(port, baud)` of every open call, successful or not.
    pub opened: Mutex<Vec<(String, u32)>>,
}

impl MockSerialOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `port` openable at exactly `baud`.
    pub fn add(&self, port: &str, baud: u32, device: ScriptedPort) {
        self.ports.lock().insert((port.to_string(), baud), device);
    }

    /// Makes `port` openable at any baud rate.
    pub fn add_any_baud(&self, port: &str, device: ScriptedPort) {
        self.any_baud.lock().insert(port.to_string(), device);
    }

    pub fn attempts(&self) -> Vec<(String, u32)> {
        self.opened.lock().clone()
    }
}

impl SerialOpener for MockSerialOpener {
    fn open(&self, port: &str, baud: u32, timeout: Duration) -> io::Result<Box<dyn SerialLink>> {
        self.opened.lock().push((port.to_string(), baud));
        let device = self
            .ports
            .lock()
            .get(&(port.to_string(), baud))
            .cloned()
            .or_else(|| self.any_baud.lock().get(port).cloned());
        match device {
            Some(device) => Ok(device.link(baud, timeout)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no scripted device on {port} @ {baud}"),
            )),
        }
    }
}

/// A fixed port list.
#[derive(Debug, Clone, Default)]
pub struct StaticPorts(pub Vec<PortInfo>);

impl PortEnumerator for StaticPorts {
    fn list_ports(&self) -> Vec<PortInfo> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_is_queued_when_trigger_written() {
        // Arrange
        let port = ScriptedPort::new();
        port.respond_to(b"km.version()\r", b"MAKCU v3\r\n");
        let mut link = port.link(115_200, Duration::from_millis(1));

        // Act
        link.write_all(b"km.version()\r").unwrap();
        let mut buf = [0u8; 32];
        let n = link.read(&mut buf).unwrap();

        // Assert
        assert_eq!(&buf[..n], b"MAKCU v3\r\n");
    }

    #[test]
    fn test_cloned_handles_share_state() {
        // Arrange
        let port = ScriptedPort::new();
        let writer = port.link(9600, Duration::from_millis(1));
        let mut reader = writer.try_clone().unwrap();

        // Act
        port.push_incoming(&[0x01]);
        let mut buf = [0u8; 1];
        let n = reader.read(&mut buf).unwrap();

        // Assert
        assert_eq!((n, buf[0]), (1, 0x01));
    }

    #[test]
    fn test_empty_read_times_out_with_zero() {
        let port = ScriptedPort::new();
        let mut link = port.link(9600, Duration::from_millis(1));
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_opener_records_attempts_and_rejects_unknown_ports() {
        // Arrange
        let opener = MockSerialOpener::new();
        opener.add("COM1", 115_200, ScriptedPort::new());

        // Act
        let bad = opener.open("COM1", 9600, Duration::from_millis(1));
        let good = opener.open("COM1", 115_200, Duration::from_millis(1));

        // Assert
        assert!(bad.is_err());
        assert!(good.is_ok());
        assert_eq!(
            opener.attempts(),
            vec![("COM1".to_string(), 9600), ("COM1".to_string(), 115_200)]
        );
    }
}
