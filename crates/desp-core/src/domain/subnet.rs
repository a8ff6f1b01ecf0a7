//! The /24 range a subnet scan sweeps.

use std::fmt;
use std::net::Ipv4Addr;

/// First host octet probed by a scan.
pub const FIRST_HOST: u8 = 1;

/// Last host octet probed by a scan; `.255` is the broadcast address and is
/// never probed.
pub const LAST_HOST: u8 = 254;

/// Number of candidates in one sweep.
pub const HOST_COUNT: usize = (LAST_HOST - FIRST_HOST) as usize + 1;

/// A /24 network identified by the first three octets of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet24 {
    prefix: [u8; 3],
}

impl Subnet24 {
    /// The /24 that contains `addr`.
    pub fn containing(addr: Ipv4Addr) -> Self {
        let [a, b, c, _] = addr.octets();
        Self { prefix: [a, b, c] }
    }

    /// The address with last octet `host` inside this subnet.
    pub fn host(&self, host: u8) -> Ipv4Addr {
        let [a, b, c] = self.prefix;
        Ipv4Addr::new(a, b, c, host)
    }

    /// Candidate hosts `.1` through `.254` in ascending order.
    pub fn candidates(&self) -> impl Iterator<Item = (u8, Ipv4Addr)> + '_ {
        (FIRST_HOST..=LAST_HOST).map(move |index| (index, self.host(index)))
    }
}

impl fmt::Display for Subnet24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/24", self.host(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_keeps_first_three_octets() {
        // Arrange
        let base = Ipv4Addr::new(192, 168, 1, 50);

        // Act
        let subnet = Subnet24::containing(base);

        // Assert
        assert_eq!(subnet.host(7), Ipv4Addr::new(192, 168, 1, 7));
    }

    #[test]
    fn test_candidates_cover_1_to_254_ascending() {
        let subnet = Subnet24::containing(Ipv4Addr::new(10, 0, 3, 200));

        let candidates: Vec<_> = subnet.candidates().collect();

        assert_eq!(candidates.len(), HOST_COUNT);
        assert_eq!(candidates.first(), Some(&(1, Ipv4Addr::new(10, 0, 3, 1))));
        assert_eq!(candidates.last(), Some(&(254, Ipv4Addr::new(10, 0, 3, 254))));
        assert!(candidates.windows(2).all(|w| w[1].0 == w[0].0 + 1));
    }

    #[test]
    fn test_candidates_never_include_network_or_broadcast() {
        let subnet = Subnet24::containing(Ipv4Addr::new(172, 16, 0, 1));

        assert!(subnet
            .candidates()
            .all(|(_, addr)| addr.octets()[3] != 0 && addr.octets()[3] != 255));
    }

    #[test]
    fn test_display_uses_cidr_notation() {
        let subnet = Subnet24::containing(Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
    }
}
