//! Address classification and endpoint-list resolution.
//!
//! Turns the loosely specified endpoint strings of a request (`"10.0.0.1
//! www.example.org 2001:db8::1"`, `"any"`, or nothing) into per-family
//! address bags, resolving hostnames through a [`Resolve`] implementation.

use crate::address::{Address, EndpointSet, WILDCARD};
use crate::error::{AclError, AclResult};
use crate::resolve::Resolve;
use tracing::debug;

/// Classify one endpoint token.
///
/// * `any` or an empty token yields an empty set (the caller decides whether
///   to substitute a wildcard).
/// * An address literal yields itself in its family.
/// * Anything else is treated as a hostname and looked up as both A and AAAA.
///   A name without records simply contributes nothing.
pub async fn classify<R: Resolve>(resolver: &R, token: &str) -> AclResult<EndpointSet> {
    let token = token.trim();
    let mut set = EndpointSet::new();
    if token.is_empty() || token == WILDCARD {
        return Ok(set);
    }

    if let Some(address) = Address::parse_literal(token) {
        set.push(address);
        return Ok(set);
    }

    for ip in resolver.resolve_a(token).await? {
        set.push(Address::V4(ip));
    }
    for ip in resolver.resolve_aaaa(token).await? {
        set.push(Address::V6(ip));
    }
    debug!(host = %token, v4 = set.v4.len(), v6 = set.v6.len(), "resolved hostname");
    Ok(set)
}

/// Resolve a whitespace-separated endpoint list into per-family bags.
///
/// `None` and the literal `any` both mean "unconstrained" and yield an empty
/// set.
pub async fn resolve_endpoint_list<R: Resolve>(
    resolver: &R,
    list: Option<&str>,
) -> AclResult<EndpointSet> {
    let mut set = EndpointSet::new();
    let list = match list.map(str::trim) {
        None => return Ok(set),
        Some(WILDCARD) => return Ok(set),
        Some(list) => list,
    };

    for token in list.split_whitespace() {
        set.extend(classify(resolver, token).await?);
    }
    Ok(set)
}

/// Resolve both endpoint lists of a request and apply the wildcard rule.
///
/// At most `max_hosts` tokens (wildcards excluded) are accepted across both
/// lists; the count is checked before any lookup. Fails when neither side
/// yields any address. Otherwise an empty side is filled with `any` in each
/// family the other side has (see [`EndpointSet::fill_wildcards`]).
pub async fn resolve_endpoints<R: Resolve>(
    resolver: &R,
    list1: Option<&str>,
    list2: Option<&str>,
    max_hosts: usize,
) -> AclResult<(EndpointSet, EndpointSet)> {
    let hosts = count_hosts(list1) + count_hosts(list2);
    if hosts > max_hosts {
        return Err(AclError::validation(format!(
            "Too many hosts requested (limit {max_hosts})."
        )));
    }

    let mut set1 = resolve_endpoint_list(resolver, list1).await?;
    let mut set2 = resolve_endpoint_list(resolver, list2).await?;

    if set1.is_empty() && set2.is_empty() {
        return Err(AclError::validation("No hosts have been specified."));
    }

    EndpointSet::fill_wildcards(&mut set1, &mut set2);
    Ok((set1, set2))
}

fn count_hosts(list: Option<&str>) -> usize {
    list.unwrap_or_default()
        .split_whitespace()
        .filter(|token| *token != WILDCARD)
        .count()
}
