//! DNS seam used by the address classifier and the `reverse_dns` action.

use crate::error::AclResult;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Forward and reverse name resolution.
///
/// A lookup that finds no records of the requested type (including a name
/// that does not exist) returns an empty list rather than an error; every
/// other failure is an [`AclError::Resolution`](crate::AclError::Resolution).
pub trait Resolve {
    /// A records of `host`.
    fn resolve_a(&self, host: &str) -> impl Future<Output = AclResult<Vec<Ipv4Addr>>> + Send;

    /// AAAA records of `host`.
    fn resolve_aaaa(&self, host: &str) -> impl Future<Output = AclResult<Vec<Ipv6Addr>>> + Send;

    /// The PTR name of `ip`, without the trailing dot.
    fn reverse_ptr(&self, ip: IpAddr) -> impl Future<Output = AclResult<String>> + Send;
}
