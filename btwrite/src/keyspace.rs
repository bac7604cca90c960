//! Derivation of row keys from an IPv4 network range.
//!
//! A [`KeySpace`] holds every host address of a range in ascending order, leaving out the network
//! and broadcast address. Addresses are computed on access, so even a `/8` range costs no more
//! than its base address and prefix length.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use rand::Rng;

use crate::error::{Error, Result};

/// The longest prefix that still leaves usable hosts: `/30` has four addresses, two of them
/// usable.
const MAX_PREFIX: u8 = 30;

/// The ordered host addresses of an IPv4 network range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySpace {
    network: Ipv4Addr,
    prefix: u8,
}

impl KeySpace {
    /// Parses a range in CIDR notation, such as `10.0.0.0/8`.
    ///
    /// Host bits of the address are ignored, so `10.1.2.3/8` describes `10.0.0.0/8`. Ranges with
    /// fewer than four addresses and IPv6 ranges are rejected.
    pub fn parse(range: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidRange {
            range: range.to_owned(),
            reason,
        };

        let (address, prefix) = range
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected `<address>/<prefix>`"))?;

        let address = match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(address)) => address,
            Ok(IpAddr::V6(_)) => return Err(invalid("only IPv4 ranges are supported")),
            Err(_) => return Err(invalid("malformed address")),
        };

        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("malformed prefix length"));
        }
        let prefix = match prefix.parse::<u8>() {
            Ok(prefix) if prefix <= 32 => prefix,
            _ => return Err(invalid("prefix length exceeds 32")),
        };
        if prefix > MAX_PREFIX {
            return Err(invalid("range has fewer than 4 addresses"));
        }

        let network = Ipv4Addr::from(u32::from(address) & mask(prefix));
        Ok(Self { network, prefix })
    }

    /// The network address, which is not part of the key space.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// The prefix length of the range.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns the number of usable addresses, `2^(32 - prefix) - 2`.
    pub fn len(&self) -> u64 {
        (1u64 << (32 - u32::from(self.prefix))) - 2
    }

    /// Always `false`, every valid range has at least two usable addresses.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the address at `index` in ascending order.
    pub fn get(&self, index: u64) -> Option<Ipv4Addr> {
        if index >= self.len() {
            return None;
        }
        // The offset is below 2^32 - 1 since len() is at most 2^32 - 2.
        let offset = (index + 1) as u32;
        Some(Ipv4Addr::from(u32::from(self.network) + offset))
    }

    /// The lowest usable address.
    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) + 1)
    }

    /// The highest usable address, just below the broadcast address.
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from((u32::from(self.network) | !mask(self.prefix)) - 1)
    }

    /// Iterates all usable addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let first = u32::from(self.first());
        let last = u32::from(self.last());
        (first..=last).map(Ipv4Addr::from)
    }

    /// Picks an address uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv4Addr {
        let first = u32::from(self.first());
        let last = u32::from(self.last());
        Ipv4Addr::from(rng.random_range(first..=last))
    }
}

fn mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

impl FromStr for KeySpace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn range(s: &str) -> KeySpace {
        KeySpace::parse(s).unwrap()
    }

    #[test]
    fn slash_30_has_two_hosts() {
        let keys = range("10.0.0.0/30");
        assert_eq!(keys.len(), 2);
        assert_eq!(
            keys.iter().collect::<Vec<_>>(),
            [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn excludes_network_and_broadcast() {
        for prefix in 0..=30u8 {
            let keys = range(&format!("10.0.0.0/{prefix}"));
            let expected = (1u64 << (32 - u32::from(prefix))) - 2;
            assert_eq!(keys.len(), expected, "/{prefix}");

            let network = u32::from(keys.network());
            let broadcast = network | !mask(prefix);
            assert_eq!(u32::from(keys.first()), network + 1, "/{prefix}");
            assert_eq!(u32::from(keys.last()), broadcast - 1, "/{prefix}");
            assert_eq!(keys.get(0), Some(keys.first()));
            assert_eq!(keys.get(keys.len() - 1), Some(keys.last()));
            assert_eq!(keys.get(keys.len()), None);
        }
    }

    #[test]
    fn iterates_in_ascending_order() {
        for prefix in 20..=30u8 {
            let keys = range(&format!("192.168.0.0/{prefix}"));
            let all: Vec<_> = keys.iter().collect();
            assert_eq!(all.len() as u64, keys.len());
            assert!(all.windows(2).all(|w| w[0] < w[1]));
            assert!(!all.contains(&keys.network()));
        }
    }

    #[test]
    fn masks_host_bits() {
        let keys = range("10.1.2.3/8");
        assert_eq!(keys.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(keys.last(), Ipv4Addr::new(10, 255, 255, 254));
        assert_eq!(keys.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn rejects_tiny_ranges() {
        for s in ["10.0.0.0/31", "10.0.0.0/32"] {
            let err = KeySpace::parse(s).unwrap_err();
            assert!(matches!(err, Error::InvalidRange { .. }), "{s}");
        }
    }

    #[test]
    fn rejects_malformed_ranges() {
        for s in [
            "",
            "10.0.0.0",
            "10.0.0/8",
            "example/8",
            "10.0.0.0/",
            "10.0.0.0/+8",
            "10.0.0.0/33",
            "10.0.0.0/256",
            "10.0.0.0/8/8",
            "fd00::/120",
        ] {
            let err = KeySpace::parse(s).unwrap_err();
            assert!(matches!(err, Error::InvalidRange { .. }), "{s:?}");
        }
    }

    #[test]
    fn choose_stays_in_range() {
        let keys = range("172.16.0.0/28");
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let address = keys.choose(&mut rng);
            assert!(address >= keys.first() && address <= keys.last());
        }
    }

    #[test]
    fn choose_covers_small_ranges() {
        let keys = range("10.0.0.0/30");
        let mut rng = SmallRng::seed_from_u64(7);
        let picked: Vec<_> = (0..100).map(|_| keys.choose(&mut rng)).collect();
        assert!(picked.contains(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(picked.contains(&Ipv4Addr::new(10, 0, 0, 2)));
    }
}
