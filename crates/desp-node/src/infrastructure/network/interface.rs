//! Local address and interface selection for multicast sessions.
//!
//! A socket bound to a multicast group has to be told which interface to join
//! on; otherwise a multi-homed host picks one arbitrarily.  When the caller
//! does not name a source address we ask the routing table which local
//! address would be used to reach the outside world, by connecting a
//! throwaway UDP socket toward a well-known public address.  Connecting a UDP
//! socket sends nothing; it only resolves the route.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Address used only to resolve the default route.
pub const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// One address of one local interface, as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub addr: IpAddr,
    pub loopback: bool,
}

/// The interface a session joins its group on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastInterface {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Returns the local IPv4 address the default route would use.
///
/// # Errors
///
/// Propagates bind/connect failures (e.g. no default route), and reports
/// `AddrNotAvailable` if the route resolves to a non-IPv4 or unspecified
/// address.
pub fn primary_outbound_addr() -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(ROUTE_PROBE_ADDR)?;
    match socket.local_addr()? {
        SocketAddr::V4(local) if !local.ip().is_unspecified() => {
            debug!("primary outbound address is {}", local.ip());
            Ok(*local.ip())
        }
        other => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("default route resolved to unusable address {other}"),
        )),
    }
}

/// Lists every address of every local interface.
///
/// # Errors
///
/// Returns the OS error if interface enumeration fails.
pub fn local_interfaces() -> io::Result<Vec<LocalInterface>> {
    Ok(if_addrs::get_if_addrs()?
        .into_iter()
        .map(|iface| LocalInterface {
            loopback: iface.is_loopback(),
            addr: iface.ip(),
            name: iface.name,
        })
        .collect())
}

/// Picks the non-loopback interface carrying `source`.
pub fn select_multicast_interface(
    interfaces: &[LocalInterface],
    source: Ipv4Addr,
) -> Option<MulticastInterface> {
    interfaces
        .iter()
        .filter(|iface| !iface.loopback)
        .find(|iface| iface.addr == IpAddr::V4(source))
        .map(|iface| MulticastInterface {
            name: iface.name.clone(),
            addr: source,
        })
}

/// The first non-loopback IPv4 address on this host.
///
/// Used as the default base address for a subnet scan.
pub fn first_non_loopback_ipv4(interfaces: &[LocalInterface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| !iface.loopback)
        .find_map(|iface| match iface.addr {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
}

/// [`first_non_loopback_ipv4`] over the live interface list.
///
/// # Errors
///
/// Returns the OS error if interface enumeration fails.
pub fn primary_ipv4() -> io::Result<Option<Ipv4Addr>> {
    Ok(first_non_loopback_ipv4(&local_interfaces()?))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addr: &str, loopback: bool) -> LocalInterface {
        LocalInterface {
            name: name.to_string(),
            addr: addr.parse().unwrap(),
            loopback,
        }
    }

    fn sample() -> Vec<LocalInterface> {
        vec![
            iface("lo", "127.0.0.1", true),
            iface("eth0", "fe80::1", false),
            iface("eth0", "192.168.1.20", false),
            iface("wlan0", "10.0.0.7", false),
        ]
    }

    #[test]
    fn test_select_matches_interface_by_address() {
        // Arrange
        let interfaces = sample();

        // Act
        let selected = select_multicast_interface(&interfaces, Ipv4Addr::new(10, 0, 0, 7));

        // Assert
        assert_eq!(
            selected,
            Some(MulticastInterface {
                name: "wlan0".to_string(),
                addr: Ipv4Addr::new(10, 0, 0, 7),
            })
        );
    }

    #[test]
    fn test_select_skips_loopback_even_when_address_matches() {
        let interfaces = sample();

        assert_eq!(
            select_multicast_interface(&interfaces, Ipv4Addr::LOCALHOST),
            None
        );
    }

    #[test]
    fn test_select_returns_none_for_unknown_address() {
        let interfaces = sample();

        assert_eq!(
            select_multicast_interface(&interfaces, Ipv4Addr::new(172, 16, 0, 1)),
            None
        );
    }

    #[test]
    fn test_first_non_loopback_ipv4_skips_loopback_and_ipv6() {
        assert_eq!(
            first_non_loopback_ipv4(&sample()),
            Some(Ipv4Addr::new(192, 168, 1, 20))
        );
    }

    #[test]
    fn test_first_non_loopback_ipv4_none_when_only_loopback() {
        let interfaces = vec![iface("lo", "127.0.0.1", true)];
        assert_eq!(first_non_loopback_ipv4(&interfaces), None);
    }

    #[test]
    fn test_local_interfaces_enumerates_without_error() {
        // Every supported OS can list its interfaces; the content is
        // environment-specific so only the call itself is checked.
        assert!(local_interfaces().is_ok());
    }
}
