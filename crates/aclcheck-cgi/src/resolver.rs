//! DNS resolution via `hickory-resolver`.
//!
//! Implements [`Resolve`] for the address classifier (A / AAAA) and the
//! `reverse_dns` action (PTR). Every lookup is bounded by the configured
//! timeout.

use aclcheck_core::{AclError, AclResult, Resolve};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::{system_conf, TokioAsyncResolver};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, warn};

/// Async DNS resolver backed by the system resolver configuration.
pub struct DnsResolver {
    inner: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsResolver {
    /// Build a resolver from `/etc/resolv.conf` (falling back to the
    /// library defaults when it cannot be read).
    pub fn from_system(timeout: Duration) -> Self {
        let (config, mut opts) = match system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!(error = %e, "cannot read system resolver config, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }

    /// Run a lookup under the outer timeout.
    async fn bounded<T>(
        &self,
        what: &str,
        lookup: impl Future<Output = Result<T, ResolveError>>,
    ) -> AclResult<Option<T>> {
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(found)) => Ok(Some(found)),
            Ok(Err(e)) if is_no_records(&e) => {
                debug!(name = %what, "no matching records");
                Ok(None)
            }
            Ok(Err(e)) => {
                warn!(name = %what, error = %e, "DNS resolution failed");
                Err(AclError::Resolution(format!(
                    "DNS resolution failed for {what}: {e}"
                )))
            }
            Err(_) => {
                warn!(name = %what, timeout = ?self.timeout, "DNS resolution timed out");
                Err(AclError::Resolution(format!(
                    "DNS resolution timed out for {what}"
                )))
            }
        }
    }
}

/// NXDOMAIN and NODATA both surface as `NoRecordsFound`.
fn is_no_records(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

impl Resolve for DnsResolver {
    async fn resolve_a(&self, host: &str) -> AclResult<Vec<Ipv4Addr>> {
        let found = self.bounded(host, self.inner.ipv4_lookup(host)).await?;
        Ok(found
            .map(|lookup| lookup.iter().map(|a| a.0).collect())
            .unwrap_or_default())
    }

    async fn resolve_aaaa(&self, host: &str) -> AclResult<Vec<Ipv6Addr>> {
        let found = self.bounded(host, self.inner.ipv6_lookup(host)).await?;
        Ok(found
            .map(|lookup| lookup.iter().map(|aaaa| aaaa.0).collect())
            .unwrap_or_default())
    }

    async fn reverse_ptr(&self, ip: IpAddr) -> AclResult<String> {
        let what = ip.to_string();
        let found = self.bounded(&what, self.inner.reverse_lookup(ip)).await?;
        let name = found
            .and_then(|lookup| lookup.iter().next().map(|ptr| ptr.0.to_string()))
            .ok_or_else(|| AclError::NotFound(format!("no PTR record for {ip}")))?;
        Ok(name.trim_end_matches('.').to_string())
    }
}
