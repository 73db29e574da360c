//! Inbound/outbound detection for UTNET checks.
//!
//! A UTNET check takes two endpoints without saying which one is the source.
//! Exactly one must be inside the named network; the tuple is then checked
//! against the inbound policy (external → internal) and the outbound policy
//! (internal → external) of the matching address family.

use crate::error::{AclError, AclResult};
use crate::network::NamedNetwork;
use crate::request::{EvaluationRequest, Tuple};
use tracing::debug;

/// The network and boundary policy names used to orient UTNET tuples.
#[derive(Debug, Clone)]
pub struct DirectionResolver {
    network: NamedNetwork,
    inbound_policy: String,
    outbound_policy: String,
}

impl DirectionResolver {
    /// `inbound_policy` / `outbound_policy` are name prefixes; `_4` or `_6` is
    /// appended from the address family of each tuple.
    pub fn new(
        network: NamedNetwork,
        inbound_policy: impl Into<String>,
        outbound_policy: impl Into<String>,
    ) -> Self {
        Self {
            network,
            inbound_policy: inbound_policy.into(),
            outbound_policy: outbound_policy.into(),
        }
    }

    pub fn network(&self) -> &NamedNetwork {
        &self.network
    }

    /// Orient one tuple and emit its `[inbound, outbound]` requests.
    pub fn resolve(&self, tuple: Tuple) -> AclResult<[EvaluationRequest; 2]> {
        let (family1, family2) = match (tuple.address1.family(), tuple.address2.family()) {
            (Some(f1), Some(f2)) => (f1, f2),
            _ => {
                return Err(AclError::validation(
                    "Both addresses need to be specified to determine the direction.",
                ))
            }
        };
        if family1 != family2 {
            return Err(AclError::validation(
                "Both addresses need to be of the same type.",
            ));
        }

        let internal1 = self.network.is_internal(&tuple.address1);
        let internal2 = self.network.is_internal(&tuple.address2);

        let ((internal, internal_port), (external, external_port)) = match (internal1, internal2) {
            (true, true) => {
                return Err(AclError::validation(format!(
                    "Both addresses belong inside the {}.",
                    self.network.name
                )))
            }
            (false, false) => {
                return Err(AclError::validation(format!(
                    "Both addresses belong outside the {}.",
                    self.network.name
                )))
            }
            (true, false) => (
                (tuple.address1, tuple.port1),
                (tuple.address2, tuple.port2),
            ),
            (false, true) => (
                (tuple.address2, tuple.port2),
                (tuple.address1, tuple.port1),
            ),
        };

        let suffix = family1.suffix();
        debug!(%internal, %external, family = %family1, "oriented tuple");

        let inbound = EvaluationRequest {
            protocol: tuple.protocol.clone(),
            src: external,
            sport: external_port,
            dst: internal,
            dport: internal_port,
            policy: format!("{}_{}", self.inbound_policy, suffix),
        };
        let outbound = EvaluationRequest {
            protocol: tuple.protocol,
            src: internal,
            sport: internal_port,
            dst: external,
            dport: external_port,
            policy: format!("{}_{}", self.outbound_policy, suffix),
        };
        Ok([inbound, outbound])
    }
}
