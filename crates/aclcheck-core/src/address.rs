//! Concrete endpoint addresses.
//!
//! An [`Address`] is either an IPv4 literal, an IPv6 literal, or the wildcard
//! `any`. The wildcard has no family; it only appears when one side of a
//! request was left unconstrained (see [`EndpointSet::fill_wildcards`]).

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// The literal used for an unconstrained endpoint.
pub const WILDCARD: &str = "any";

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Suffix used in per-family policy names (`utwente-inbound_4`).
    pub fn suffix(self) -> &'static str {
        match self {
            Family::V4 => "4",
            Family::V6 => "6",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// A single endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Any,
}

impl Address {
    /// Parse an address literal. Hostnames and `any` return `None`.
    pub fn parse_literal(token: &str) -> Option<Self> {
        token.parse::<IpAddr>().ok().map(Self::from)
    }

    /// The family of a concrete address; `None` for the wildcard.
    pub fn family(&self) -> Option<Family> {
        match self {
            Address::V4(_) => Some(Family::V4),
            Address::V6(_) => Some(Family::V6),
            Address::Any => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Address::Any)
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Address::V4(v4),
            IpAddr::V6(v6) => Address::V6(v6),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Address::V4(ip)
    }
}

impl From<Ipv6Addr> for Address {
    fn from(ip: Ipv6Addr) -> Self {
        Address::V6(ip)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(ip) => write!(f, "{ip}"),
            Address::V6(ip) => write!(f, "{ip}"),
            Address::Any => f.write_str(WILDCARD),
        }
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Addresses derived from one endpoint list, split by family.
///
/// These are bags rather than sets: duplicates are kept and simply produce
/// duplicate evaluation requests further down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    pub v4: Vec<Address>,
    pub v6: Vec<Address>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a concrete address to the bag of its family.
    pub fn push(&mut self, address: Address) {
        match address.family() {
            Some(Family::V4) => self.v4.push(address),
            Some(Family::V6) => self.v6.push(address),
            None => {}
        }
    }

    pub fn extend(&mut self, other: EndpointSet) {
        self.v4.extend(other.v4);
        self.v6.extend(other.v6);
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Addresses of one family.
    pub fn family(&self, family: Family) -> &[Address] {
        match family {
            Family::V4 => &self.v4,
            Family::V6 => &self.v6,
        }
    }

    fn family_mut(&mut self, family: Family) -> &mut Vec<Address> {
        match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        }
    }

    /// Substitute a wildcard for a side that resolved to nothing.
    ///
    /// Applied per family: when `a` has addresses of a family and `b` has no
    /// addresses at all, `b` gets a single `any` in that family (and the
    /// other way round). A side that has addresses of the *other* family is
    /// left alone, so that family simply produces no tuples. Emptiness is
    /// judged before any substitution, so the two families are independent.
    pub fn fill_wildcards(a: &mut EndpointSet, b: &mut EndpointSet) {
        let a_empty = a.is_empty();
        let b_empty = b.is_empty();
        for family in [Family::V4, Family::V6] {
            if !a.family(family).is_empty() && b_empty {
                b.family_mut(family).push(Address::Any);
            } else if !b.family(family).is_empty() && a_empty {
                a.family_mut(family).push(Address::Any);
            }
        }
    }
}
