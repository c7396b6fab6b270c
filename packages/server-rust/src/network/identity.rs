//! Process-wide cache of this host's network addresses.
//!
//! Built once by [`init_local_addresses`] at startup and read lock-free
//! afterwards. Enumeration failures leave the set empty and log a warning;
//! an empty set means "unknown", so nothing treats it as a denial.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::OnceLock;

use ferrule_core::RequestAttributes;
use tracing::{info, warn};

static LOCAL_ADDRESSES: OnceLock<NetworkAddressSet> = OnceLock::new();

/// Immutable set of IPv4/IPv6 addresses. IPv4-mapped IPv6 addresses are
/// stored and looked up in their IPv4 form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAddressSet {
    addrs: HashSet<IpAddr>,
}

impl NetworkAddressSet {
    #[must_use]
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().map(|ip| ip.to_canonical()).collect(),
        }
    }

    /// Builds the set from `enumerate`, degrading to an empty set on failure.
    pub fn from_enumerator<F>(enumerate: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Vec<IpAddr>>,
    {
        match enumerate() {
            Ok(addrs) => Self::new(addrs),
            Err(err) => {
                warn!(error = %err, "could not enumerate local network addresses, continuing with none");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.addrs.contains(&addr.to_canonical())
    }

    /// Lookup by raw address bytes: 4 octets for IPv4, 16 for IPv6.
    #[must_use]
    pub fn contains_octets(&self, octets: &[u8]) -> bool {
        if let Ok(v4) = <[u8; 4]>::try_from(octets) {
            return self.contains(IpAddr::from(v4));
        }
        if let Ok(v6) = <[u8; 16]>::try_from(octets) {
            return self.contains(IpAddr::from(v6));
        }
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addrs.iter()
    }
}

/// Builds the process-wide set on first call and returns it on every call.
/// Concurrent first callers wait for the single initializer.
pub fn init_local_addresses() -> &'static NetworkAddressSet {
    LOCAL_ADDRESSES.get_or_init(|| {
        let set = NetworkAddressSet::from_enumerator(enumerate_interfaces);
        info!(count = set.len(), "local network addresses cached");
        set
    })
}

/// The process-wide set, initialising it if startup has not done so yet.
pub fn local_addresses() -> &'static NetworkAddressSet {
    init_local_addresses()
}

fn enumerate_interfaces() -> anyhow::Result<Vec<IpAddr>> {
    let interfaces = local_ip_address::list_afinet_netifas()?;
    Ok(interfaces.into_iter().map(|(_name, ip)| ip).collect())
}

/// Origin flags for a peer address: this host, a private network, or outside.
#[must_use]
pub fn origin_attributes(peer: Option<IpAddr>, local: &NetworkAddressSet) -> RequestAttributes {
    let Some(ip) = peer.map(|ip| ip.to_canonical()) else {
        return RequestAttributes::empty();
    };
    if ip.is_loopback() || local.contains(ip) {
        RequestAttributes::LOCALHOST
    } else if is_private(ip) {
        RequestAttributes::LOCAL_SUBNET
    } else {
        RequestAttributes::EXTERNAL
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn failed_enumeration_is_empty_not_fatal() {
        let set = NetworkAddressSet::from_enumerator(|| anyhow::bail!("not supported"));
        assert!(set.is_empty());
        assert!(!set.contains(ip("10.0.0.1")));
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_entry() {
        let set = NetworkAddressSet::new([ip("10.1.2.3")]);
        assert!(set.contains(ip("::ffff:10.1.2.3")));

        let set = NetworkAddressSet::new([ip("::ffff:192.168.0.9")]);
        assert!(set.contains(ip("192.168.0.9")));
    }

    #[test]
    fn lookup_by_raw_octets() {
        let set = NetworkAddressSet::new([ip("192.168.1.20"), ip("fe80::1")]);
        assert!(set.contains_octets(&[192, 168, 1, 20]));
        assert!(set.contains_octets(&ip_v6_octets("fe80::1")));
        assert!(!set.contains_octets(&[192, 168, 1]));
    }

    fn ip_v6_octets(s: &str) -> [u8; 16] {
        s.parse::<Ipv6Addr>().unwrap().octets()
    }

    #[test]
    fn process_set_is_built_once() {
        let first = init_local_addresses();
        let second = local_addresses();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn origin_classification() {
        let local = NetworkAddressSet::new([ip("203.0.113.7")]);
        assert_eq!(
            origin_attributes(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), &local),
            RequestAttributes::LOCALHOST
        );
        assert_eq!(
            origin_attributes(Some(ip("203.0.113.7")), &local),
            RequestAttributes::LOCALHOST
        );
        assert_eq!(
            origin_attributes(Some(ip("10.0.0.5")), &local),
            RequestAttributes::LOCAL_SUBNET
        );
        assert_eq!(
            origin_attributes(Some(ip("fd00::5")), &local),
            RequestAttributes::LOCAL_SUBNET
        );
        assert_eq!(
            origin_attributes(Some(ip("8.8.8.8")), &local),
            RequestAttributes::EXTERNAL
        );
        assert!(origin_attributes(None, &local).is_empty());
    }

    #[test]
    fn empty_set_still_recognises_loopback() {
        let empty = NetworkAddressSet::default();
        assert_eq!(
            origin_attributes(Some(ip("::1")), &empty),
            RequestAttributes::LOCALHOST
        );
    }
}
