//! Cross-product expansion of a request into concrete tuples.
//!
//! Order is part of the contract: family (IPv4 first), then protocol, then
//! address1, address2, port1, port2 (innermost). Result records come back to
//! the caller in exactly this order.

use crate::address::{EndpointSet, Family};
use crate::error::{AclError, AclResult};
use crate::request::{is_icmp, Tuple};

/// Expand protocols × addresses × ports into tuples, IPv4 before IPv6.
///
/// ICMP tuples carry no ports. Every other protocol needs both port lists;
/// the check is made only when such a protocol actually meets an address
/// pair, mirroring the lazy failure of the nested loops. At most `max_tuples`
/// tuples are produced; one more is a validation error.
pub fn expand(
    protocols: &str,
    set1: &EndpointSet,
    ports1: Option<&str>,
    set2: &EndpointSet,
    ports2: Option<&str>,
    max_tuples: usize,
) -> AclResult<Vec<Tuple>> {
    let mut tuples = Vec::new();
    for family in [Family::V4, Family::V6] {
        expand_family(
            &mut tuples,
            protocols,
            set1,
            ports1,
            set2,
            ports2,
            family,
            max_tuples,
        )?;
    }
    Ok(tuples)
}

#[allow(clippy::too_many_arguments)]
fn expand_family(
    out: &mut Vec<Tuple>,
    protocols: &str,
    set1: &EndpointSet,
    ports1: Option<&str>,
    set2: &EndpointSet,
    ports2: Option<&str>,
    family: Family,
    max_tuples: usize,
) -> AclResult<()> {
    for protocol in protocols.split_whitespace() {
        for address1 in set1.family(family) {
            for address2 in set2.family(family) {
                if is_icmp(protocol) {
                    push_bounded(
                        out,
                        Tuple {
                            protocol: protocol.to_string(),
                            address1: *address1,
                            port1: None,
                            address2: *address2,
                            port2: None,
                        },
                        max_tuples,
                    )?;
                    continue;
                }

                let (list1, list2) = port_lists(ports1, ports2)?;
                for port1 in &list1 {
                    for port2 in &list2 {
                        push_bounded(
                            out,
                            Tuple {
                                protocol: protocol.to_string(),
                                address1: *address1,
                                port1: Some(*port1),
                                address2: *address2,
                                port2: Some(*port2),
                            },
                            max_tuples,
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn push_bounded(out: &mut Vec<Tuple>, tuple: Tuple, max_tuples: usize) -> AclResult<()> {
    if out.len() >= max_tuples {
        return Err(AclError::validation(format!(
            "Too many combinations requested (limit {max_tuples})."
        )));
    }
    out.push(tuple);
    Ok(())
}

/// Both port lists, parsed. Either one missing or blank is an error.
fn port_lists(ports1: Option<&str>, ports2: Option<&str>) -> AclResult<(Vec<u16>, Vec<u16>)> {
    let list1 = parse_ports(ports1)?;
    let list2 = parse_ports(ports2)?;
    if list1.is_empty() || list2.is_empty() {
        return Err(AclError::validation(
            "No ports have been specified for TCP / UDP.",
        ));
    }
    Ok((list1, list2))
}

fn parse_ports(list: Option<&str>) -> AclResult<Vec<u16>> {
    list.unwrap_or_default()
        .split_whitespace()
        .map(|token| {
            token
                .parse::<u16>()
                .map_err(|_| AclError::validation(format!("Invalid port: {token}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn set(tokens: &[&str]) -> EndpointSet {
        let mut set = EndpointSet::new();
        for t in tokens {
            set.push(Address::parse_literal(t).unwrap());
        }
        set
    }

    #[test]
    fn tcp_cross_product_size() {
        let a = set(&["10.0.0.1", "10.0.0.2"]);
        let b = set(&["192.0.2.1", "192.0.2.2", "192.0.2.3"]);
        let tuples = expand("tcp udp", &a, Some("1024 1025"), &b, Some("80 443"), 1000).unwrap();
        // P · A1 · A2 · S1 · S2
        assert_eq!(tuples.len(), 2 * 2 * 3 * 2 * 2);
    }

    #[test]
    fn icmp_ignores_ports() {
        let a = set(&["10.0.0.1", "10.0.0.2"]);
        let b = set(&["192.0.2.1"]);
        let tuples = expand("icmp ICMP", &a, None, &b, Some("80 443"), 1000).unwrap();
        assert_eq!(tuples.len(), 2 * 2);
        assert!(tuples.iter().all(|t| t.port1.is_none() && t.port2.is_none()));
    }

    #[test]
    fn ordering_is_nested() {
        let a = set(&["10.0.0.1", "10.0.0.2"]);
        let b = set(&["192.0.2.1"]);
        let tuples = expand("tcp", &a, Some("1 2"), &b, Some("3 4"), 1000).unwrap();
        let seen: Vec<(String, u16, u16)> = tuples
            .iter()
            .map(|t| (t.address1.to_string(), t.port1.unwrap(), t.port2.unwrap()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("10.0.0.1".to_string(), 1, 3),
                ("10.0.0.1".to_string(), 1, 4),
                ("10.0.0.1".to_string(), 2, 3),
                ("10.0.0.1".to_string(), 2, 4),
                ("10.0.0.2".to_string(), 1, 3),
                ("10.0.0.2".to_string(), 1, 4),
                ("10.0.0.2".to_string(), 2, 3),
                ("10.0.0.2".to_string(), 2, 4),
            ]
        );
    }

    #[test]
    fn ipv4_before_ipv6() {
        let a = set(&["2001:db8::1", "10.0.0.1"]);
        let b = set(&["2001:db8::2", "10.0.0.2"]);
        let tuples = expand("icmp", &a, None, &b, None, 1000).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].address1.family(), Some(Family::V4));
        assert_eq!(tuples[1].address1.family(), Some(Family::V6));
    }

    #[test]
    fn missing_ports_fail_for_tcp() {
        let a = set(&["10.0.0.1"]);
        let b = set(&["10.0.0.2"]);
        let err = expand("tcp", &a, None, &b, Some("443"), 1000).unwrap_err();
        assert_eq!(err.to_string(), "No ports have been specified for TCP / UDP.");
        let err = expand("udp", &a, Some("53"), &b, Some("   "), 1000).unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn missing_ports_ignored_without_address_pairs() {
        // Only IPv6 on one side and IPv4 on the other: nothing to pair up.
        let a = set(&["10.0.0.1"]);
        let b = set(&["2001:db8::1"]);
        let tuples = expand("tcp", &a, None, &b, None, 1000).unwrap();
        assert!(tuples.is_empty());
    }

    #[test]
    fn invalid_port_rejected() {
        let a = set(&["10.0.0.1"]);
        let b = set(&["10.0.0.2"]);
        let err = expand("tcp", &a, Some("80"), &b, Some("65536"), 1000).unwrap_err();
        assert_eq!(err.to_string(), "Invalid port: 65536");
        let err = expand("tcp", &a, Some("http"), &b, Some("80"), 1000).unwrap_err();
        assert_eq!(err.to_string(), "Invalid port: http");
    }

    #[test]
    fn wildcard_pairs_expand() {
        let a = set(&["10.0.0.1"]);
        let mut b = EndpointSet::new();
        b.v4.push(Address::Any);
        let tuples = expand("tcp", &a, Some("80"), &b, Some("443"), 1000).unwrap();
        assert_eq!(tuples.len(), 1);
        assert!(tuples[0].address2.is_wildcard());
    }

    #[test]
    fn expansion_is_bounded() {
        let a = set(&["10.0.0.1", "10.0.0.2"]);
        let b = set(&["10.0.0.3", "10.0.0.4"]);
        assert_eq!(expand("tcp", &a, Some("1 2"), &b, Some("3 4"), 16).unwrap().len(), 16);
        let err = expand("tcp", &a, Some("1 2"), &b, Some("3 4"), 15).unwrap_err();
        assert_eq!(err.to_string(), "Too many combinations requested (limit 15).");
    }
}
