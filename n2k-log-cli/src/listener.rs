//! UDP listener
//!
//! Owns the socket bound to the gateway's RAW port. Receives are bounded by
//! the configured read timeout so the caller can poll its shutdown flag and
//! run housekeeping between datagrams.
//!
//! [`DatagramSource`] is what the pipeline consumes; the UDP listener is one
//! implementation and file replay is the other.

use crate::config::ListenerConfig;
use n2k_log_decoder::Datagram;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;

/// Largest payload a UDP datagram can carry
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Unrecoverable listener failures
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("Failed to configure UDP socket: {0}")]
    Configure(#[source] io::Error),

    #[error("UDP receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("UDP receive failed {count} times in a row, last error: {last}")]
    TooManyErrors {
        count: u32,
        #[source]
        last: io::Error,
    },

    #[error("Failed to read capture file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Result of one poll of a datagram source
#[derive(Debug)]
pub enum Incoming<'a> {
    Datagram(Datagram<'a>),
    /// Nothing arrived within the read timeout
    Idle,
    /// The source has no more data
    Closed,
}

/// Where the pipeline gets its datagrams from
pub trait DatagramSource {
    fn poll(&mut self) -> Result<Incoming<'_>, ListenerError>;

    /// Transient receive errors recovered from so far
    fn transient_errors(&self) -> u64 {
        0
    }
}

/// Errors worth retrying: the socket itself is still usable
fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

/// Read timeout expiry, reported differently per platform
fn is_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

pub struct UdpListener {
    socket: UdpSocket,
    buffer: Vec<u8>,
    max_consecutive_errors: u32,
    consecutive_errors: u32,
    transient_errors: u64,
}

impl UdpListener {
    /// Bind and configure the socket described by `config`
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = config.socket_addr();

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(ListenerError::Configure)?;

        if let Some(size) = config.recv_buffer_size {
            socket
                .set_recv_buffer_size(size)
                .map_err(ListenerError::Configure)?;
        }

        socket
            .bind(&addr.into())
            .map_err(|source| ListenerError::Bind { addr, source })?;

        socket
            .set_read_timeout(Some(config.read_timeout()))
            .map_err(ListenerError::Configure)?;

        let recv_buffer = socket.recv_buffer_size().unwrap_or(0);
        let listener = Self {
            socket: socket.into(),
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            max_consecutive_errors: config.max_consecutive_errors,
            consecutive_errors: 0,
            transient_errors: 0,
        };

        // Port 0 binds are only known after the fact
        log::info!(
            "Listening on {} (receive buffer {} bytes, read timeout {} ms)",
            listener.local_addr()?,
            recv_buffer,
            config.read_timeout_ms
        );
        Ok(listener)
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.socket.local_addr().map_err(ListenerError::Configure)
    }

    /// Wait up to the read timeout for the next datagram.
    ///
    /// Returns `Ok(None)` when the timeout expires without data.
    pub fn recv(&mut self) -> Result<Option<Datagram<'_>>, ListenerError> {
        loop {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, peer)) => {
                    self.consecutive_errors = 0;
                    log::trace!("Received {} bytes from {}", len, peer);
                    return Ok(Some(Datagram::now(&self.buffer[..len])));
                }
                Err(e) if is_timeout(e.kind()) => {
                    self.consecutive_errors = 0;
                    return Ok(None);
                }
                Err(e) => self.on_recv_error(e)?,
            }
        }
    }

    /// Decide whether a failed receive may be retried.
    ///
    /// Transient errors are tolerated up to `max_consecutive_errors` in a row;
    /// anything else is fatal straight away.
    fn on_recv_error(&mut self, e: io::Error) -> Result<(), ListenerError> {
        if !is_transient(e.kind()) {
            return Err(ListenerError::Receive(e));
        }

        self.consecutive_errors += 1;
        self.transient_errors += 1;
        if self.consecutive_errors > self.max_consecutive_errors {
            return Err(ListenerError::TooManyErrors {
                count: self.consecutive_errors,
                last: e,
            });
        }

        log::warn!(
            "Transient UDP receive error ({}/{}): {}",
            self.consecutive_errors,
            self.max_consecutive_errors,
            e
        );
        Ok(())
    }
}

impl DatagramSource for UdpListener {
    fn poll(&mut self) -> Result<Incoming<'_>, ListenerError> {
        Ok(match self.recv()? {
            Some(datagram) => Incoming::Datagram(datagram),
            None => Incoming::Idle,
        })
    }

    fn transient_errors(&self) -> u64 {
        self.transient_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback_config() -> ListenerConfig {
        ListenerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            read_timeout_ms: 50,
            ..ListenerConfig::default()
        }
    }

    #[test]
    fn test_timeout_returns_none() {
        let mut listener = UdpListener::bind(&loopback_config()).unwrap();
        assert!(listener.recv().unwrap().is_none());
        assert_eq!(listener.transient_errors(), 0);
    }

    #[test]
    fn test_receive_datagram() {
        let mut listener = UdpListener::bind(&loopback_config()).unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let payload = b"17:33:21.141 R 09F80115 A0 7D E6 18 C0 05 FB D5\r\n";
        sender.send_to(payload, addr).unwrap();

        let datagram = listener.recv().unwrap().unwrap();
        assert_eq!(datagram.bytes, &payload[..]);
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let first = UdpListener::bind(&loopback_config()).unwrap();
        let config = ListenerConfig {
            port: first.local_addr().unwrap().port(),
            ..loopback_config()
        };

        match UdpListener::bind(&config) {
            Err(ListenerError::Bind { addr, .. }) => assert_eq!(addr, config.socket_addr()),
            other => panic!("expected a bind error, got {:?}", other.map(|_| ())),
        }
    }

    fn reset() -> io::Error {
        io::Error::from(io::ErrorKind::ConnectionReset)
    }

    #[test]
    fn test_transient_errors_are_bounded() {
        let mut listener = UdpListener::bind(&loopback_config()).unwrap();

        for _ in 0..16 {
            assert!(listener.on_recv_error(reset()).is_ok());
        }
        match listener.on_recv_error(reset()) {
            Err(ListenerError::TooManyErrors { count, last }) => {
                assert_eq!(count, 17);
                assert_eq!(last.kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("expected too many errors, got {:?}", other),
        }
        assert_eq!(listener.transient_errors(), 17);
    }

    #[test]
    fn test_other_errors_are_fatal_at_once() {
        let mut listener = UdpListener::bind(&loopback_config()).unwrap();

        assert!(matches!(
            listener.on_recv_error(io::Error::from(io::ErrorKind::PermissionDenied)),
            Err(ListenerError::Receive(_))
        ));
        assert_eq!(listener.transient_errors(), 0);
    }

    #[test]
    fn test_error_run_resets_after_timeout_and_datagram() {
        let mut listener = UdpListener::bind(&loopback_config()).unwrap();
        let addr = listener.local_addr().unwrap();

        for _ in 0..16 {
            listener.on_recv_error(reset()).unwrap();
        }
        assert!(listener.recv().unwrap().is_none());
        for _ in 0..16 {
            listener.on_recv_error(reset()).unwrap();
        }

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"x", addr).unwrap();
        assert!(listener.recv().unwrap().is_some());
        for _ in 0..16 {
            listener.on_recv_error(reset()).unwrap();
        }

        // The total keeps counting across runs
        assert_eq!(listener.transient_errors(), 48);
    }

    #[test]
    fn test_poll_reports_idle() {
        let mut listener = UdpListener::bind(&loopback_config()).unwrap();
        assert!(matches!(listener.poll().unwrap(), Incoming::Idle));
    }

    #[test]
    fn test_error_classification() {
        assert!(is_transient(io::ErrorKind::Interrupted));
        assert!(is_transient(io::ErrorKind::ConnectionReset));
        assert!(!is_transient(io::ErrorKind::PermissionDenied));
        assert!(is_timeout(io::ErrorKind::WouldBlock));
        assert!(is_timeout(io::ErrorKind::TimedOut));
    }
}
