//! aclcheck-core: request expansion and endpoint classification.
//!
//! Turns loosely specified endpoint and port lists into the ordered set of
//! concrete (protocol, src, sport, dst, dport) evaluation requests, orienting
//! them against the UTNET boundary policies when no policy is named. Name
//! resolution is reached through the [`Resolve`] trait; policy evaluation
//! itself happens elsewhere.

pub mod address;
pub mod classify;
pub mod direction;
pub mod error;
pub mod expand;
pub mod network;
pub mod request;
pub mod resolve;

// Re-export commonly used items at crate root.
pub use address::{Address, EndpointSet, Family, WILDCARD};
pub use classify::{classify, resolve_endpoint_list, resolve_endpoints};
pub use direction::DirectionResolver;
pub use error::{AclError, AclResult};
pub use expand::expand;
pub use network::NamedNetwork;
pub use request::{is_icmp, Action, EvaluationRequest, ResultRecord, Tuple, ICMP};
pub use resolve::Resolve;
