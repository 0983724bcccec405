//! UDP datagram transport
//!
//! The receiver reads from anything implementing [`DatagramSource`]: the UDP
//! socket below, a recorded capture (see [`crate::replay`]) or a scripted
//! source in tests. A receive blocks for at most the poll timeout so that the
//! loop can check its stop signal even when no traffic arrives.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Outcome of one receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// A datagram of this many bytes was written into the buffer
    Datagram(usize),
    /// Nothing arrived within the poll timeout
    Timeout,
    /// The source started over from its beginning; nothing before this
    /// belongs to the same frame as anything after it
    Rewound,
    /// The source is exhausted and will never yield again
    Closed,
}

/// Source of fragment datagrams
pub trait DatagramSource {
    /// Receive one datagram into `buf`
    ///
    /// Datagrams longer than `buf` are truncated, as with a UDP socket.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the source failed in a way that cannot be
    /// retried. Timeouts are reported as [`RecvOutcome::Timeout`], not errors.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<RecvOutcome>;
}

/// UDP socket bound for receiving fragments
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to `addr` (e.g. `0.0.0.0:8000`) with the given poll timeout
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the address cannot be bound or the timeout is
    /// zero.
    pub fn bind(addr: &str, poll_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll_timeout))?;
        let local_addr = socket.local_addr()?;

        log::info!(
            "Listening on {} (poll timeout {} ms)",
            local_addr,
            poll_timeout.as_millis()
        );

        Ok(Self { socket, local_addr })
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl DatagramSource for UdpTransport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<RecvOutcome> {
        match self.socket.recv_from(buf) {
            Ok((len, _peer)) => Ok(RecvOutcome::Datagram(len)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(RecvOutcome::Timeout)
            }
            // Windows reports ICMP port-unreachable from earlier sends here
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                log::debug!("Ignoring connection reset on UDP socket");
                Ok(RecvOutcome::Timeout)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        log::info!("Closing UDP socket on {}", self.local_addr);
    }
}
