//! Pure IP allocation logic (spec module B), kept free of any database
//! dependency so its correctness can be checked without a pool.

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::{StoreError, StoreResult};

/// Return the numerically smallest address in `prefix` that is neither the
/// network nor the broadcast/all-ones address and is absent from `taken`.
pub fn next_free_address(prefix: &IpNet, taken: &HashSet<IpAddr>) -> StoreResult<IpAddr> {
    let network = prefix.network();
    let broadcast = prefix.broadcast();
    for addr in prefix.hosts() {
        if addr == network || addr == broadcast {
            continue;
        }
        if !taken.contains(&addr) {
            return Ok(addr);
        }
    }
    Err(StoreError::NoAddressesAvailable)
}

/// Allocate one address from each of a v4 and a v6 overlay prefix.
pub fn allocate_pair(
    v4_prefix: &IpNet,
    v6_prefix: &IpNet,
    taken_v4: &HashSet<IpAddr>,
    taken_v6: &HashSet<IpAddr>,
) -> StoreResult<(IpAddr, IpAddr)> {
    let v4 = next_free_address(v4_prefix, taken_v4)?;
    let v6 = next_free_address(v6_prefix, taken_v6)?;
    Ok((v4, v6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn skips_network_and_broadcast() {
        let prefix = net("100.64.0.0/24");
        let taken = HashSet::new();
        let first = next_free_address(&prefix, &taken).unwrap();
        assert_eq!(first, IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1)));
    }

    #[test]
    fn picks_numerically_smallest_unallocated() {
        let prefix = net("100.64.0.0/24");
        let mut taken = HashSet::new();
        taken.insert(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1)));
        taken.insert(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 2)));
        let next = next_free_address(&prefix, &taken).unwrap();
        assert_eq!(next, IpAddr::V4(Ipv4Addr::new(100, 64, 0, 3)));
    }

    #[test]
    fn exhausted_prefix_errors() {
        let prefix = net("100.64.0.0/30");
        let mut taken = HashSet::new();
        // /30 has exactly two usable host addresses: .1 and .2
        taken.insert(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1)));
        taken.insert(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 2)));
        assert!(matches!(
            next_free_address(&prefix, &taken),
            Err(StoreError::NoAddressesAvailable)
        ));
    }

    #[test]
    fn allocates_v4_and_v6_independently() {
        let v4 = net("100.64.0.0/24");
        let v6 = net("fd7a:115c:a1e0::/48");
        let (a4, a6) = allocate_pair(&v4, &v6, &HashSet::new(), &HashSet::new()).unwrap();
        assert!(v4.contains(&a4));
        assert!(v6.contains(&a6));
    }

    proptest::proptest! {
        #[test]
        fn never_returns_network_or_broadcast(n in 1u8..=200) {
            let prefix = net("10.0.0.0/24");
            let mut taken = HashSet::new();
            for i in 1..n {
                taken.insert(IpAddr::V4(Ipv4Addr::new(10, 0, 0, i)));
            }
            if let Ok(addr) = next_free_address(&prefix, &taken) {
                proptest::prop_assert_ne!(addr, prefix.network());
                proptest::prop_assert_ne!(addr, prefix.broadcast());
                proptest::prop_assert!(!taken.contains(&addr));
            }
        }
    }
}
