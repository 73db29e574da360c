//! Named networks (e.g. `UTNET`) and the internal/external test.

use crate::address::Address;
use ipnet::IpNet;

/// An ordered list of CIDR ranges known by a symbolic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedNetwork {
    pub name: String,
    pub ranges: Vec<IpNet>,
}

impl NamedNetwork {
    pub fn new(name: impl Into<String>, ranges: Vec<IpNet>) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }

    /// Whether `address` lies inside any range of this network.
    ///
    /// Containment is only tested between an address and a range of the same
    /// family; a mismatched pair never matches. The wildcard is never internal.
    pub fn is_internal(&self, address: &Address) -> bool {
        self.ranges.iter().any(|range| match (range, address) {
            (IpNet::V4(net), Address::V4(ip)) => net.contains(ip),
            (IpNet::V6(net), Address::V6(ip)) => net.contains(ip),
            _ => false,
        })
    }
}
