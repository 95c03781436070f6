//! Network addresses, grounded on `tpn::Address`
//! (`examples/original_source/tpn/address.h`): a node's reachable
//! socket address plus an optional human-readable hostname, used by
//! the overlay's bootstrap list and the tracker client
//! (`spec.md` §4.3, §6).

use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A network address a node may be reached at.
///
/// Orders IPv4 addresses before IPv6 addresses at equal port, the way
/// `tpn::Address`'s comparison prefers the more specific, more
/// commonly NAT-traversable family first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    socket: SocketAddr,
    /// A hostname this address was resolved from, if any, kept around
    /// purely for display and reconnection after an IP change.
    hostname: Option<String>,
}

impl Address {
    /// Builds an address from a socket address with no associated
    /// hostname.
    pub fn new(socket: SocketAddr) -> Self {
        Address {
            socket,
            hostname: None,
        }
    }

    /// Builds an address carrying both a socket address and the
    /// hostname it was resolved from.
    pub fn with_hostname(socket: SocketAddr, hostname: impl Into<String>) -> Self {
        Address {
            socket,
            hostname: Some(hostname.into()),
        }
    }

    /// The address's socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket
    }

    /// The hostname this address was resolved from, if known.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hostname {
            Some(h) => write!(f, "{h} ({})", self.socket),
            None => write!(f, "{}", self.socket),
        }
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Address::new(s.parse()?))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        fn family_rank(a: &SocketAddr) -> u8 {
            if a.is_ipv4() {
                0
            } else {
                1
            }
        }
        family_rank(&self.socket)
            .cmp(&family_rank(&other.socket))
            .then_with(|| self.socket.port().cmp(&other.socket.port()))
            .then_with(|| self.socket.ip().cmp(&other.socket.ip()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_sorts_before_ipv6_at_equal_port() {
        let v4: Address = "127.0.0.1:9090".parse().unwrap();
        let v6: Address = "[::1]:9090".parse().unwrap();
        assert!(v4 < v6);
    }

    #[test]
    fn display_shows_hostname_when_present() {
        let a = Address::with_hostname("127.0.0.1:9090".parse::<SocketAddr>().unwrap(), "peer.example");
        assert_eq!(a.to_string(), "peer.example (127.0.0.1:9090)");
    }
}
