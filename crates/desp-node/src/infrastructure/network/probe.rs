//! Liveness probes: one `!ping` / `!pong` round trip against one address.
//!
//! A probe writes a ping frame with a write timeout, then waits for the reply
//! with a read timeout of the same length.  Only a reply of exactly the
//! 9-byte pong frame counts; anything else, and every I/O failure, means "no
//! peer here".  Most addresses in a sweep will not answer, so failures are
//! logged at trace level and otherwise swallowed.
//!
//! # Testability
//!
//! The [`Prober`] trait lets the ranger's loop be driven by a mock in unit
//! tests.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, UdpSocket};
use std::time::Duration;

use desp_core::protocol::{is_pong_frame, Control, CONTROL_FRAME_LEN};
use desp_core::Transport;
use tracing::trace;

/// One probe strategy.
#[cfg_attr(test, mockall::automock)]
pub trait Prober: Send {
    /// The transport reported on scan events.
    fn transport(&self) -> Transport;

    /// Pings `target`; returns the responder's address on a valid pong.
    fn probe(&self, target: SocketAddrV4) -> Option<SocketAddr>;
}

/// Builds the prober for `transport`.
pub fn prober_for(transport: Transport, timeout: Duration) -> Box<dyn Prober> {
    match transport {
        Transport::Udp => Box::new(UdpProber::new(timeout)),
        Transport::Tcp => Box::new(TcpProber::new(timeout)),
    }
}

/// Probes over a short-lived connected UDP socket.
#[derive(Debug, Clone, Copy)]
pub struct UdpProber {
    timeout: Duration,
}

impl UdpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn exchange(&self, target: SocketAddrV4) -> io::Result<Option<SocketAddr>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(target)?;
        socket.set_write_timeout(Some(self.timeout))?;
        socket.send(&Control::Ping.to_frame())?;

        socket.set_read_timeout(Some(self.timeout))?;
        // One spare byte so an oversized reply is not truncated into a match.
        let mut buf = [0u8; CONTROL_FRAME_LEN + 1];
        let n = socket.recv(&mut buf)?;
        if is_pong_frame(&buf[..n]) {
            Ok(Some(socket.peer_addr()?))
        } else {
            Ok(None)
        }
    }
}

impl Prober for UdpProber {
    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn probe(&self, target: SocketAddrV4) -> Option<SocketAddr> {
        self.exchange(target).unwrap_or_else(|e| {
            trace!("udp probe of {target} failed: {e}");
            None
        })
    }
}

/// Probes over a TCP connection.
///
/// Sessions only listen on UDP, so this finds peers running a TCP responder.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn exchange(&self, target: SocketAddrV4) -> io::Result<Option<SocketAddr>> {
        let mut stream = TcpStream::connect_timeout(&SocketAddr::V4(target), self.timeout)?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(&Control::Ping.to_frame())?;

        stream.set_read_timeout(Some(self.timeout))?;
        let mut buf = [0u8; CONTROL_FRAME_LEN];
        stream.read_exact(&mut buf)?;
        if is_pong_frame(&buf) {
            Ok(Some(stream.peer_addr()?))
        } else {
            Ok(None)
        }
    }
}

impl Prober for TcpProber {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn probe(&self, target: SocketAddrV4) -> Option<SocketAddr> {
        self.exchange(target).unwrap_or_else(|e| {
            trace!("tcp probe of {target} failed: {e}");
            None
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn v4(addr: SocketAddr) -> SocketAddrV4 {
        match addr {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => panic!("expected IPv4"),
        }
    }

    /// Answers one datagram with `reply` from a loopback UDP socket.
    fn udp_responder(reply: &'static [u8]) -> SocketAddrV4 {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = v4(socket.local_addr().unwrap());
        thread::spawn(move || {
            let mut buf = [0u8; 64];
            if let Ok((n, src)) = socket.recv_from(&mut buf) {
                assert_eq!(&buf[..n], b"DESP!ping");
                let _ = socket.send_to(reply, src);
            }
        });
        addr
    }

    #[test]
    fn test_prober_for_selects_transport() {
        assert_eq!(prober_for(Transport::Udp, TIMEOUT).transport(), Transport::Udp);
        assert_eq!(prober_for(Transport::Tcp, TIMEOUT).transport(), Transport::Tcp);
    }

    #[test]
    fn test_udp_probe_reports_pong_responder() {
        // Arrange
        let target = udp_responder(b"DESP!pong");

        // Act
        let peer = UdpProber::new(TIMEOUT).probe(target);

        // Assert
        assert_eq!(peer, Some(SocketAddr::V4(target)));
    }

    #[test]
    fn test_udp_probe_ignores_wrong_reply() {
        let target = udp_responder(b"DESP!ping");
        assert_eq!(UdpProber::new(TIMEOUT).probe(target), None);
    }

    #[test]
    fn test_udp_probe_ignores_oversized_reply() {
        let target = udp_responder(b"DESP!pong!");
        assert_eq!(UdpProber::new(TIMEOUT).probe(target), None);
    }

    #[test]
    fn test_udp_probe_times_out_on_silent_host() {
        // Arrange – bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = v4(silent.local_addr().unwrap());

        // Act
        let peer = UdpProber::new(Duration::from_millis(100)).probe(target);

        // Assert
        assert_eq!(peer, None);
        drop(silent);
    }

    #[test]
    fn test_tcp_probe_reports_pong_responder() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = v4(listener.local_addr().unwrap());
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; CONTROL_FRAME_LEN];
                if stream.read_exact(&mut buf).is_ok() && &buf == b"DESP!ping" {
                    let _ = stream.write_all(b"DESP!pong");
                }
            }
        });

        // Act
        let peer = TcpProber::new(TIMEOUT).probe(target);

        // Assert
        assert_eq!(peer, Some(SocketAddr::V4(target)));
    }

    #[test]
    fn test_tcp_probe_refused_is_none() {
        // Arrange – grab a free port, then release it.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = v4(listener.local_addr().unwrap());
        drop(listener);

        // Act / Assert
        assert_eq!(TcpProber::new(TIMEOUT).probe(target), None);
    }
}
