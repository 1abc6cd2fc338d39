//! UDP client for DHZ boxes.
//!
//! Each command is one datagram.  Queries send a command and wait for one
//! reply datagram; an exchange lock is held across that pair so replies from
//! the listener's polls and from callers' key queries cannot cross.  Plain
//! sends skip the lock and never wait behind a query.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use kmbridge_core::protocol::dhz;
use parking_lot::Mutex;
use thiserror::Error;

/// Default per-attempt reply timeout.
pub const QUERY_TIMEOUT: Duration = Duration::from_millis(20);

/// Default number of retries after the first attempt.
pub const QUERY_RETRIES: u32 = 1;

#[derive(Debug, Error)]
pub enum DhzError {
    #[error("timeout after {:.3}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("invalid bool response: {0:?}")]
    InvalidResponse(String),
    #[error("{0}")]
    Io(#[from] io::Error),
}

pub struct DhzClient {
    socket: UdpSocket,
    /// Held for one request/reply pair.
    exchange: Mutex<()>,
    addr: SocketAddr,
    shift: i32,
}

impl DhzClient {
    /// Binds an ephemeral local socket aimed at `ip:port`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the address does not resolve or the socket
    /// cannot be bound.
    pub fn new(ip: &str, port: u16, shift: i32) -> io::Result<Self> {
        let addr = (ip, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("cannot resolve {ip}"))
        })?;
        let local: SocketAddr = if addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(QUERY_TIMEOUT))?;
        Ok(Self {
            socket,
            exchange: Mutex::new(()),
            addr,
            shift: shift.rem_euclid(26),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shift(&self) -> i32 {
        self.shift
    }

    /// Sends a command without waiting for a reply.
    pub fn send(&self, command: &str) -> io::Result<()> {
        let payload = dhz::encode_command(command, self.shift);
        self.socket.send_to(&payload, self.addr)?;
        Ok(())
    }

    /// Sends a command and returns the decoded reply.
    ///
    /// A timed-out attempt is retried up to `retries` more times; any other
    /// socket error ends the query immediately.
    pub fn request(&self, command: &str, timeout: Duration, retries: u32) -> Result<String, DhzError> {
        let timeout = timeout.max(Duration::from_millis(1));
        let payload = dhz::encode_command(command, self.shift);
        let mut buf = [0u8; 1024];
        for _ in 0..=retries {
            let _turn = self.exchange.lock();
            self.socket.set_read_timeout(Some(timeout))?;
            self.socket.send_to(&payload, self.addr)?;
            match self.socket.recv_from(&mut buf) {
                Ok((n, _)) => return Ok(dhz::decode_response(&buf[..n], self.shift)),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => return Err(DhzError::Io(e)),
            }
        }
        Err(DhzError::Timeout(timeout))
    }

    /// Sends a query and reads a yes/no answer from the reply.
    pub fn query_bool(&self, command: &str, timeout: Duration, retries: u32) -> Result<bool, DhzError> {
        let response = self.request(command, timeout, retries)?;
        dhz::parse_bool_response(&response, self.shift).ok_or(DhzError::InvalidResponse(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder(reply: &'static str, shift: i32) -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        let server = socket.try_clone().unwrap();
        std::thread::spawn(move || {
            let mut buf = [0u8; 256];
            if let Ok((_, from)) = server.recv_from(&mut buf) {
                let wire = dhz::encode_command(reply, shift);
                let _ = server.send_to(&wire, from);
            }
        });
        (socket, port)
    }

    #[test]
    fn test_query_bool_decodes_shifted_reply() {
        // Arrange
        let (_server, port) = responder("1", 3);
        let client = DhzClient::new("127.0.0.1", port, 3).unwrap();

        // Act
        let pressed = client.query_bool("isdown_left()", Duration::from_millis(500), 0);

        // Assert
        assert!(pressed.unwrap());
    }

    #[test]
    fn test_request_times_out_without_responder() {
        // Arrange
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let client = DhzClient::new("127.0.0.1", port, 0).unwrap();

        // Act
        let result = client.request("isdown_left()", Duration::from_millis(10), 1);

        // Assert
        assert!(matches!(result, Err(DhzError::Timeout(_))));
    }

    #[test]
    fn test_shift_is_normalised() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let client = DhzClient::new("127.0.0.1", port, -1).unwrap();
        assert_eq!(client.shift(), 25);
    }

    #[test]
    fn test_timeout_message_format() {
        assert_eq!(DhzError::Timeout(Duration::from_millis(20)).to_string(), "timeout after 0.020s");
    }
}
