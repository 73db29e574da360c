//! Request and result records passed between the expansion stages.

use crate::address::Address;
use crate::error::{AclError, AclResult};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The protocol that carries no ports.
pub const ICMP: &str = "icmp";

/// Whether `protocol` names ICMP (case-insensitive).
pub fn is_icmp(protocol: &str) -> bool {
    protocol.eq_ignore_ascii_case(ICMP)
}

/// The four request kinds understood by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Policies,
    CheckAcl,
    CheckUtnet,
    ReverseDns,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Policies => "policies",
            Action::CheckAcl => "check_acl",
            Action::CheckUtnet => "check_utnet",
            Action::ReverseDns => "reverse_dns",
        }
    }
}

impl FromStr for Action {
    type Err = AclError;

    fn from_str(s: &str) -> AclResult<Self> {
        match s {
            "policies" => Ok(Action::Policies),
            "check_acl" => Ok(Action::CheckAcl),
            "check_utnet" => Ok(Action::CheckUtnet),
            "reverse_dns" => Ok(Action::ReverseDns),
            other => Err(AclError::validation(format!("Unknown action: {other}"))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete combination produced by the tuple expander, before a policy
/// (and, in UTNET mode, a direction) has been attached.
///
/// `port1`/`port2` are `None` exactly when the protocol is ICMP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub protocol: String,
    pub address1: Address,
    pub port1: Option<u16>,
    pub address2: Address,
    pub port2: Option<u16>,
}

impl Tuple {
    /// Read the tuple as source → destination against a fixed policy.
    pub fn into_request(self, policy: &str) -> EvaluationRequest {
        EvaluationRequest {
            protocol: self.protocol,
            src: self.address1,
            sport: self.port1,
            dst: self.address2,
            dport: self.port2,
            policy: policy.to_string(),
        }
    }
}

/// A single 5-tuple bound to the policy it must be checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub protocol: String,
    pub src: Address,
    pub sport: Option<u16>,
    pub dst: Address,
    pub dport: Option<u16>,
    pub policy: String,
}

/// The outcome of checking one [`EvaluationRequest`].
///
/// Serializes to the JSON object the web frontend consumes. Absent (ICMP)
/// ports are written as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    pub protocol: String,
    pub source_address: Address,
    #[serde(serialize_with = "port_or_zero")]
    pub source_port: Option<u16>,
    pub destination_address: Address,
    #[serde(serialize_with = "port_or_zero")]
    pub destination_port: Option<u16>,
    pub policy_file: String,
    pub result: String,
}

impl ResultRecord {
    pub fn new(request: EvaluationRequest, result: String) -> Self {
        Self {
            protocol: request.protocol,
            source_address: request.src,
            source_port: request.sport,
            destination_address: request.dst,
            destination_port: request.dport,
            policy_file: request.policy,
            result,
        }
    }
}

fn port_or_zero<S: Serializer>(port: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(port.unwrap_or(0))
}
