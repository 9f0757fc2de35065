use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

/// A self-describing network address string of the form `/ip4/<dotted>/tcp/<port>`.
///
/// This is the only address shape the dialer path recognizes; anything else is an
/// [`InvalidAddress`] at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiaddr(SocketAddrV4);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid multiaddr: {0}")]
pub struct InvalidAddress(pub String);

impl Multiaddr {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }

    /// Formats a `SocketAddr` as the canonical `/ip4/<dotted>/tcp/<port>` multiaddr string.
    ///
    /// Used by the listener-adoption and dialer paths when recording `addr_info` into the
    /// metadata registry. Only IPv4 is representable; there is no `/ip6/` segment, so non-v4
    /// addresses fall back to the loopback placeholder rendered through the same
    /// `/ip4/.../tcp/...` template for diagnostic purposes.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Multiaddr(v4),
            SocketAddr::V6(v6) => {
                // Best-effort: represent as an ip4-shaped string carrying the v6 octets'
                // rendering isn't meaningful, so fall back to the loopback placeholder.
                let _ = v6;
                Multiaddr(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, addr.port()))
            }
        }
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ip4/{}/tcp/{}", self.0.ip(), self.0.port())
    }
}

impl FromStr for Multiaddr {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let invalid = || InvalidAddress(s.to_string());

        if parts.next() != Some("") {
            return Err(invalid());
        }
        if parts.next() != Some("ip4") {
            return Err(invalid());
        }
        let ip: Ipv4Addr = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        if parts.next() != Some("tcp") {
            return Err(invalid());
        }
        let port: u16 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Multiaddr(SocketAddrV4::new(ip, port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_multiaddr() {
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        assert_eq!(addr.to_string(), "/ip4/127.0.0.1/tcp/4001");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!("/dns4/example.com/tcp/4001".parse::<Multiaddr>().is_err());
        assert!("/ip4/127.0.0.1/udp/4001".parse::<Multiaddr>().is_err());
        assert!("not-a-multiaddr".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn roundtrips_through_socket_addr() {
        let addr: Multiaddr = "/ip4/10.0.0.1/tcp/9000".parse().unwrap();
        let back = Multiaddr::from_socket_addr(addr.socket_addr());
        assert_eq!(addr, back);
    }
}
