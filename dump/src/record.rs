use crate::key::PeerKey;
use chrono::{DateTime, Utc};
use common::{CounterMapping, PeerUsage};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// An allowed-IP range, stored as its network address and prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowedIp {
    network: IpAddr,
    prefix: u8,
}

impl AllowedIp {
    /// Host bits of `addr` are cleared. Fails if `prefix` exceeds the
    /// address width.
    pub fn new(addr: IpAddr, prefix: u8) -> Option<Self> {
        let network = match addr {
            IpAddr::V4(v4) => {
                if prefix > 32 {
                    return None;
                }
                let value = u32::from_be_bytes(v4.octets()) & ipv4_mask(prefix);
                IpAddr::from(value.to_be_bytes())
            }
            IpAddr::V6(v6) => {
                if prefix > 128 {
                    return None;
                }
                let value = u128::from_be_bytes(v6.octets()) & ipv6_mask(prefix);
                IpAddr::from(value.to_be_bytes())
            }
        };
        Some(Self { network, prefix })
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = ipv4_mask(self.prefix);
                u32::from_be_bytes(ip.octets()) & mask == u32::from_be_bytes(net.octets())
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = ipv6_mask(self.prefix);
                u128::from_be_bytes(ip.octets()) & mask == u128::from_be_bytes(net.octets())
            }
            _ => false,
        }
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn ipv4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn ipv6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix as u32)
    }
}

/// One peer line of a `wg show <iface> dump`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPeerRecord {
    pub public_key: PeerKey,
    /// `None` when the dump shows `(none)`.
    pub preshared_key: Option<PeerKey>,
    pub endpoint: Option<SocketAddr>,
    pub allowed_ips: Vec<AllowedIp>,
    /// `None` if the peer never completed a handshake.
    pub last_handshake: Option<DateTime<Utc>>,
    pub receive_bytes: u64,
    pub transmit_bytes: u64,
    /// Zero when keepalive is off.
    pub persistent_keepalive: Duration,
}

impl DumpPeerRecord {
    pub fn to_usage(&self, mapping: CounterMapping) -> PeerUsage {
        mapping.to_usage(
            self.public_key.to_base64(),
            self.receive_bytes,
            self.transmit_bytes,
        )
    }
}

/// The interface line plus the peer lines of a live device dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDump {
    pub public_key: PeerKey,
    pub listen_port: u16,
    pub fwmark: Option<u32>,
    pub peers: Vec<DumpPeerRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_allowed_ip_masks_host_bits() {
        let ip = AllowedIp::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 19)), 24).unwrap();
        assert_eq!(ip.network(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(ip.to_string(), "10.0.0.0/24");
        assert!(ip.contains(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 200))));
        assert!(!ip.contains(&IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1))));
    }

    #[test]
    fn test_allowed_ip_v6() {
        let addr: Ipv6Addr = "fdd0:438e:19ba:5069::13".parse().unwrap();
        let ip = AllowedIp::new(IpAddr::V6(addr), 128).unwrap();
        assert_eq!(ip.to_string(), "fdd0:438e:19ba:5069::13/128");
        assert!(!ip.contains(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_allowed_ip_rejects_wide_prefix() {
        assert!(AllowedIp::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 33).is_none());
        assert!(AllowedIp::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 129).is_none());
        assert!(AllowedIp::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).is_some());
    }
}
