//! Request orchestration: one CGI request in, one JSON response out.
//!
//! # Data Flow
//!
//! ```text
//! Params
//!   → dispatch (action)
//!     policies     → PolicyStore::list_policies
//!     check_acl    → resolve_endpoints → expand → PolicyChecker::check (each)
//!     check_utnet  → resolve_endpoints → expand → DirectionResolver::resolve
//!                    → PolicyChecker::check (inbound, outbound per tuple)
//!     reverse_dns  → Resolve::reverse_ptr (failures become "")
//! ```
//!
//! Nothing is retained between requests, and a request either returns every
//! result record or fails as a whole.

use crate::cgi::{Params, Response};
use crate::checker::PolicyChecker;
use crate::engine::PolicyEngine;
use aclcheck_core::{
    expand, resolve_endpoints, AclError, AclResult, Action, DirectionResolver, EvaluationRequest,
    Resolve, ResultRecord,
};
use serde_json::Value;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// The UTNET network name and the prefixes of its boundary policies.
#[derive(Debug, Clone)]
pub struct UtnetSettings {
    pub network: String,
    pub inbound_policy: String,
    pub outbound_policy: String,
}

/// Per-request work bounds.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    /// Evaluation requests one request may generate.
    pub max_requests: usize,
    /// Endpoint tokens resolved before expansion.
    pub max_hosts: usize,
}

pub struct Orchestrator<R, E> {
    resolver: R,
    checker: PolicyChecker<E>,
    utnet: UtnetSettings,
    limits: RequestLimits,
}

impl<R: Resolve, E: PolicyEngine> Orchestrator<R, E> {
    pub fn new(
        resolver: R,
        checker: PolicyChecker<E>,
        utnet: UtnetSettings,
        limits: RequestLimits,
    ) -> Self {
        Self {
            resolver,
            checker,
            utnet,
            limits,
        }
    }

    /// Dispatch and flatten the outcome into a response.
    pub async fn handle(&self, params: &Params) -> Response {
        match self.dispatch(params).await {
            Ok(body) => Response::ok(body),
            Err(e) => {
                warn!(code = e.code(), error = %e, "request failed");
                Response::error(&e)
            }
        }
    }

    pub async fn dispatch(&self, params: &Params) -> AclResult<Value> {
        let action: Action = params
            .get("action")
            .ok_or_else(|| AclError::Validation("No action has been specified.".into()))?
            .parse()?;
        info!(%action, "dispatching request");

        match action {
            Action::Policies => {
                let names = self.checker.store().list_policies().await?;
                Ok(Value::from(names))
            }
            Action::CheckAcl => to_json(self.check_acl(params).await?),
            Action::CheckUtnet => to_json(self.check_utnet(params).await?),
            Action::ReverseDns => Ok(Value::String(self.reverse_dns(params.get("address")).await)),
        }
    }

    /// Check the cross product of the request against one named policy.
    pub async fn check_acl(&self, params: &Params) -> AclResult<Vec<ResultRecord>> {
        let policy = required(params, "policy_file", "No policy file has been specified.")?;
        let protocols = required(params, "protocols", "No protocols have been specified.")?;

        let (sources, destinations) = resolve_endpoints(
            &self.resolver,
            params.get("source_addresses"),
            params.get("destination_addresses"),
            self.limits.max_hosts,
        )
        .await?;

        let requests: Vec<EvaluationRequest> = expand(
            protocols,
            &sources,
            params.get("source_ports"),
            &destinations,
            params.get("destination_ports"),
            self.limits.max_requests,
        )?
        .into_iter()
        .map(|tuple| tuple.into_request(policy))
        .collect();

        self.check_all(requests).await
    }

    /// Check the cross product against the UTNET inbound and outbound
    /// policies, orienting each tuple by which endpoint is internal.
    pub async fn check_utnet(&self, params: &Params) -> AclResult<Vec<ResultRecord>> {
        let protocols = required(params, "protocols", "No protocols have been specified.")?;

        let (set1, set2) = resolve_endpoints(
            &self.resolver,
            params.get("addresses1"),
            params.get("addresses2"),
            self.limits.max_hosts,
        )
        .await?;

        // Every tuple becomes two requests.
        let tuples = expand(
            protocols,
            &set1,
            params.get("ports1"),
            &set2,
            params.get("ports2"),
            self.limits.max_requests / 2,
        )?;
        if tuples.is_empty() {
            return Ok(Vec::new());
        }

        let network = self
            .checker
            .store()
            .resolve_named_network(&self.utnet.network)
            .await?;
        let direction = DirectionResolver::new(
            network,
            &self.utnet.inbound_policy,
            &self.utnet.outbound_policy,
        );
        debug!(
            network = %direction.network().name,
            ranges = direction.network().ranges.len(),
            tuples = tuples.len(),
            "orienting tuples"
        );

        let mut requests = Vec::with_capacity(tuples.len() * 2);
        for tuple in tuples {
            requests.extend(direction.resolve(tuple)?);
        }
        self.check_all(requests).await
    }

    /// Hostname of `address`, or an empty string on any failure.
    pub async fn reverse_dns(&self, address: Option<&str>) -> String {
        let Some(ip) = address.and_then(|a| a.trim().parse::<IpAddr>().ok()) else {
            debug!(address = ?address, "reverse_dns without a valid address");
            return String::new();
        };
        match self.resolver.reverse_ptr(ip).await {
            Ok(name) => name,
            Err(e) => {
                debug!(%ip, error = %e, "reverse lookup failed");
                String::new()
            }
        }
    }

    async fn check_all(&self, requests: Vec<EvaluationRequest>) -> AclResult<Vec<ResultRecord>> {
        info!(count = requests.len(), "checking requests");
        let mut records = Vec::with_capacity(requests.len());
        for request in requests {
            records.push(self.checker.check(request).await?);
        }
        Ok(records)
    }
}

fn required<'p>(params: &'p Params, key: &str, message: &str) -> AclResult<&'p str> {
    params
        .get(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AclError::Validation(message.to_string()))
}

fn to_json(records: Vec<ResultRecord>) -> AclResult<Value> {
    serde_json::to_value(records)
        .map_err(|e| AclError::Validation(format!("cannot encode results: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Evaluation;
    use crate::store::{PolicyDocument, PolicyStore};
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StaticResolver {
        a: HashMap<String, Vec<Ipv4Addr>>,
        aaaa: HashMap<String, Vec<Ipv6Addr>>,
        ptr: HashMap<IpAddr, String>,
        lookups: AtomicUsize,
    }

    impl Resolve for StaticResolver {
        async fn resolve_a(&self, host: &str) -> AclResult<Vec<Ipv4Addr>> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            Ok(self.a.get(host).cloned().unwrap_or_default())
        }

        async fn resolve_aaaa(&self, host: &str) -> AclResult<Vec<Ipv6Addr>> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            Ok(self.aaaa.get(host).cloned().unwrap_or_default())
        }

        async fn reverse_ptr(&self, ip: IpAddr) -> AclResult<String> {
            self.ptr
                .get(&ip)
                .cloned()
                .ok_or_else(|| AclError::NotFound(format!("no PTR record for {ip}")))
        }
    }

    /// Accepts everything from 10.0.0.0/8, denies the rest; counts calls.
    #[derive(Default)]
    struct CountingEngine {
        calls: AtomicUsize,
    }

    impl PolicyEngine for CountingEngine {
        async fn evaluate(
            &self,
            document: &PolicyDocument,
            request: &EvaluationRequest,
        ) -> AclResult<Evaluation> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let verdict = if request.src.to_string().starts_with("10.") {
                "accept"
            } else {
                "deny"
            };
            Ok(Evaluation {
                verdict: verdict.to_string(),
                comments: document.header_comments(),
            })
        }
    }

    fn capirca_tree(dir: &Path) -> PolicyStore {
        let policies = dir.join("policies");
        let def = dir.join("def");
        std::fs::create_dir_all(&policies).unwrap();
        std::fs::create_dir_all(&def).unwrap();
        for name in [
            "test",
            "utwente-inbound_4",
            "utwente-outbound_4",
            "utwente-inbound_6",
            "utwente-outbound_6",
        ] {
            std::fs::write(
                policies.join(format!("{name}.pol")),
                format!("header {{\n  comment:: \"{name}\"\n}}\n"),
            )
            .unwrap();
        }
        std::fs::write(
            def.join("NETWORK.net"),
            "UTNET = 10.0.0.0/8\n        2001:db8:100::/48\n",
        )
        .unwrap();
        PolicyStore::new(policies, def)
    }

    fn orchestrator(dir: &Path) -> Orchestrator<StaticResolver, CountingEngine> {
        let mut resolver = StaticResolver::default();
        resolver
            .a
            .insert("www.example.org".into(), vec!["192.0.2.80".parse().unwrap()]);
        resolver
            .aaaa
            .insert("www.example.org".into(), vec!["2001:db8:999::80".parse().unwrap()]);
        resolver
            .ptr
            .insert("10.0.0.5".parse().unwrap(), "host5.example.org".into());

        Orchestrator::new(
            resolver,
            PolicyChecker::new(capirca_tree(dir), CountingEngine::default()),
            UtnetSettings {
                network: "UTNET".into(),
                inbound_policy: "utwente-inbound".into(),
                outbound_policy: "utwente-outbound".into(),
            },
            RequestLimits {
                max_requests: 64,
                max_hosts: 8,
            },
        )
    }

    fn calls(o: &Orchestrator<StaticResolver, CountingEngine>) -> usize {
        o.checker.engine().calls.load(Ordering::Relaxed)
    }

    #[tokio::test]
    async fn lists_policies_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let body = o.dispatch(&Params::parse("action=policies")).await.unwrap();
        assert_eq!(
            body,
            json!([
                "test",
                "utwente-inbound_4",
                "utwente-inbound_6",
                "utwente-outbound_4",
                "utwente-outbound_6",
            ])
        );
    }

    #[tokio::test]
    async fn check_acl_single_tuple() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let body = o
            .dispatch(&Params::parse(
                "action=check_acl&policy_file=test&protocols=tcp&source_addresses=10.0.0.1\
                 &source_ports=80&destination_addresses=10.0.0.2&destination_ports=443",
            ))
            .await
            .unwrap();
        assert_eq!(
            body,
            json!([{
                "protocol": "tcp",
                "source_address": "10.0.0.1",
                "source_port": 80,
                "destination_address": "10.0.0.2",
                "destination_port": 443,
                "policy_file": "test",
                "result": "accept\n\ntest",
            }])
        );
    }

    #[tokio::test]
    async fn check_acl_expands_hostnames_and_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let records = o
            .check_acl(&Params::parse(
                "policy_file=test&protocols=tcp+icmp&source_addresses=www.example.org\
                 &source_ports=1024&destination_ports=80+443",
            ))
            .await
            .unwrap();
        // IPv4: tcp (2 ports) + icmp, then the same for IPv6.
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.destination_address.is_wildcard()));
        assert_eq!(records[0].source_address.to_string(), "192.0.2.80");
        assert_eq!(records[2].protocol, "icmp");
        assert_eq!(records[2].source_port, None);
        assert_eq!(records[3].source_address.to_string(), "2001:db8:999::80");
    }

    #[tokio::test]
    async fn check_acl_without_ports_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let err = o
            .dispatch(&Params::parse(
                "action=check_acl&policy_file=test&protocols=tcp\
                 &source_addresses=10.0.0.1&destination_addresses=10.0.0.2&destination_ports=443",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No ports have been specified for TCP / UDP.");
        assert_eq!(calls(&o), 0);
    }

    #[tokio::test]
    async fn check_acl_requires_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let err = o
            .dispatch(&Params::parse(
                "action=check_acl&policy_file=test&protocols=icmp&source_addresses=any",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No hosts have been specified.");
    }

    #[tokio::test]
    async fn check_acl_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let err = o
            .dispatch(&Params::parse(
                "action=check_acl&policy_file=..%2F..%2Fetc%2Fpasswd&protocols=icmp\
                 &source_addresses=10.0.0.1",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        assert_eq!(calls(&o), 0);
    }

    #[tokio::test]
    async fn check_utnet_orients_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let records = o
            .check_utnet(&Params::parse(
                "protocols=icmp&addresses1=192.0.2.1&addresses2=10.0.0.5",
            ))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].policy_file, "utwente-inbound_4");
        assert_eq!(records[0].source_address.to_string(), "192.0.2.1");
        assert_eq!(records[0].destination_address.to_string(), "10.0.0.5");
        assert_eq!(records[0].result, "deny\n\nutwente-inbound_4");

        assert_eq!(records[1].policy_file, "utwente-outbound_4");
        assert_eq!(records[1].source_address.to_string(), "10.0.0.5");
        assert_eq!(records[1].destination_address.to_string(), "192.0.2.1");
        assert_eq!(records[1].result, "accept\n\nutwente-outbound_4");
    }

    #[tokio::test]
    async fn check_utnet_ipv6_policies() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let records = o
            .check_utnet(&Params::parse(
                "protocols=tcp&addresses1=2001:db8:100::1&ports1=22\
                 &addresses2=2001:db8:999::1&ports2=50000",
            ))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].policy_file, "utwente-inbound_6");
        assert_eq!(records[0].source_port, Some(50000));
        assert_eq!(records[0].destination_port, Some(22));
        assert_eq!(records[1].policy_file, "utwente-outbound_6");
    }

    #[tokio::test]
    async fn check_utnet_both_inside_fails_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        // The first pair is fine, the second is not; nothing is returned.
        let err = o
            .dispatch(&Params::parse(
                "action=check_utnet&protocols=icmp&addresses1=10.0.0.5\
                 &addresses2=192.0.2.1+10.0.0.6",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Both addresses belong inside the UTNET.");
        assert_eq!(calls(&o), 0);
    }

    #[tokio::test]
    async fn check_utnet_missing_network_definition() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = orchestrator(dir.path());
        o.utnet.network = "CAMPUS".into();
        let err = o
            .check_utnet(&Params::parse(
                "protocols=icmp&addresses1=192.0.2.1&addresses2=10.0.0.5",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn expansion_limit_applies() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let ports: Vec<String> = (1..=9).map(|p| p.to_string()).collect();
        let query = format!(
            "action=check_acl&policy_file=test&protocols=tcp&source_addresses=10.0.0.1\
             &destination_addresses=10.0.0.2&source_ports={0}&destination_ports={0}",
            ports.join("+")
        );
        let err = o.dispatch(&Params::parse(&query)).await.unwrap_err();
        assert_eq!(err.to_string(), "Too many combinations requested (limit 64).");
    }

    #[tokio::test]
    async fn host_limit_rejects_before_resolving() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let hosts: Vec<String> = (0..9).map(|i| format!("h{i}.example.org")).collect();

        let query = format!(
            "action=check_acl&policy_file=test&protocols=icmp&source_addresses={}",
            hosts.join("+")
        );
        let err = o.dispatch(&Params::parse(&query)).await.unwrap_err();
        assert_eq!(err.to_string(), "Too many hosts requested (limit 8).");

        let query = format!(
            "action=check_utnet&protocols=icmp&addresses1={}&addresses2={}",
            hosts[..4].join("+"),
            hosts[4..].join("+")
        );
        let err = o.dispatch(&Params::parse(&query)).await.unwrap_err();
        assert_eq!(err.code(), "validation");

        assert_eq!(o.resolver.lookups.load(Ordering::Relaxed), 0);
        assert_eq!(calls(&o), 0);
    }

    #[tokio::test]
    async fn reverse_dns_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let found = o
            .dispatch(&Params::parse("action=reverse_dns&address=10.0.0.5"))
            .await
            .unwrap();
        assert_eq!(found, json!("host5.example.org"));

        let missing = o
            .dispatch(&Params::parse("action=reverse_dns&address=192.0.2.1"))
            .await
            .unwrap();
        assert_eq!(missing, json!(""));

        let garbage = o
            .dispatch(&Params::parse("action=reverse_dns&address=not-an-ip"))
            .await
            .unwrap();
        assert_eq!(garbage, json!(""));

        let absent = o.dispatch(&Params::parse("action=reverse_dns")).await.unwrap();
        assert_eq!(absent, json!(""));
    }

    #[tokio::test]
    async fn unknown_and_missing_actions() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let response = o.handle(&Params::parse("action=frobnicate")).await;
        assert_eq!(response.body, json!("Unknown action: frobnicate"));
        assert_eq!(response.error_code, Some("validation"));

        let response = o.handle(&Params::parse("")).await;
        assert_eq!(response.body, json!("No action has been specified."));
    }

    #[tokio::test]
    async fn missing_required_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path());
        let err = o
            .dispatch(&Params::parse("action=check_acl&protocols=tcp&source_addresses=10.0.0.1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No policy file has been specified.");

        let err = o
            .dispatch(&Params::parse("action=check_utnet&addresses1=10.0.0.1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No protocols have been specified.");
    }
}
