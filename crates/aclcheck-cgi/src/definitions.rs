//! Capirca network definitions (`def/*.net`).
//!
//! ```text
//! RFC1918 = 10.0.0.0/8      # private
//!           172.16.0.0/12
//!           192.168.0.0/16
//! UTNET = 130.89.0.0/16
//!         2001:67c:2564::/48
//!         RFC1918
//! ```
//!
//! A definition starts with `NAME =` and continues on indented lines. Each
//! token is a CIDR range, a bare address, or the name of another definition.

use aclcheck_core::{AclError, AclResult};
use ipnet::IpNet;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use tracing::warn;

/// Parsed network definitions, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    networks: HashMap<String, Vec<String>>,
}

impl Definitions {
    /// Add the definitions of one `.net` file. A name defined again replaces
    /// the earlier definition.
    pub fn parse_networks(&mut self, content: &str) {
        let mut current: Option<String> = None;
        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or_default();
            if line.trim().is_empty() {
                continue;
            }

            if let Some((name, values)) = line.split_once('=') {
                let name = name.trim().to_string();
                let tokens = values.split_whitespace().map(str::to_string).collect();
                if self.networks.insert(name.clone(), tokens).is_some() {
                    warn!(network = %name, "network redefined");
                }
                current = Some(name);
            } else if raw.starts_with(char::is_whitespace) {
                if let Some(name) = &current {
                    if let Some(tokens) = self.networks.get_mut(name) {
                        tokens.extend(line.split_whitespace().map(str::to_string));
                    }
                }
            } else {
                warn!(line = %line.trim(), "ignoring unparsable definitions line");
                current = None;
            }
        }
    }

    /// All ranges of `name`, with nested names expanded in place.
    pub fn network(&self, name: &str) -> AclResult<Vec<IpNet>> {
        let mut ranges = Vec::new();
        let mut visiting = HashSet::new();
        self.expand_into(name, &mut ranges, &mut visiting)?;
        Ok(ranges)
    }

    fn expand_into<'a>(
        &'a self,
        name: &'a str,
        out: &mut Vec<IpNet>,
        visiting: &mut HashSet<&'a str>,
    ) -> AclResult<()> {
        let tokens = self
            .networks
            .get(name)
            .ok_or_else(|| AclError::NotFound(format!("Network definition not found: {name}")))?;
        if !visiting.insert(name) {
            return Err(AclError::Config(format!(
                "Network definition {name} refers to itself"
            )));
        }

        for token in tokens {
            match parse_range(token) {
                Some(range) => out.push(range),
                None => self.expand_into(token, out, visiting)?,
            }
        }

        visiting.remove(name);
        Ok(())
    }
}

fn parse_range(token: &str) -> Option<IpNet> {
    if let Ok(net) = token.parse::<IpNet>() {
        return Some(net);
    }
    match token.parse::<IpAddr>().ok()? {
        ip @ IpAddr::V4(_) => IpNet::new(ip, 32).ok(),
        ip @ IpAddr::V6(_) => IpNet::new(ip, 128).ok(),
    }
}
