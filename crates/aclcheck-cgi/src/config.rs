//! CGI configuration: TOML file + CLI/environment overrides.

use aclcheck_core::{AclError, AclResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub capirca: CapircaSection,
    #[serde(default)]
    pub utnet: UtnetSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub evaluator: EvaluatorSection,
}

/// `[capirca]` section: where policies and definitions live.
#[derive(Debug, Clone, Deserialize)]
pub struct CapircaSection {
    #[serde(default = "default_base")]
    pub base: String,
    /// Defaults to `<base>/policies`.
    #[serde(default)]
    pub policy_dir: Option<String>,
    /// Defaults to `<base>/def`.
    #[serde(default)]
    pub definitions_dir: Option<String>,
}

impl Default for CapircaSection {
    fn default() -> Self {
        Self {
            base: default_base(),
            policy_dir: None,
            definitions_dir: None,
        }
    }
}

/// `[utnet]` section: the internal network and its boundary policies.
#[derive(Debug, Clone, Deserialize)]
pub struct UtnetSection {
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_inbound_policy")]
    pub inbound_policy: String,
    #[serde(default = "default_outbound_policy")]
    pub outbound_policy: String,
}

impl Default for UtnetSection {
    fn default() -> Self {
        Self {
            network: default_network(),
            inbound_policy: default_inbound_policy(),
            outbound_policy: default_outbound_policy(),
        }
    }
}

/// `[limits]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Hostname and address tokens accepted across both endpoint lists.
    #[serde(default = "default_max_hosts")]
    pub max_hosts: usize,
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout_secs: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            max_hosts: default_max_hosts(),
            dns_timeout_secs: default_dns_timeout(),
        }
    }
}

/// `[evaluator]` section: the external policy evaluation command.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorSection {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

fn default_base() -> String {
    "/usr/local/capirca".to_string()
}
fn default_network() -> String {
    "UTNET".to_string()
}
fn default_inbound_policy() -> String {
    "utwente-inbound".to_string()
}
fn default_outbound_policy() -> String {
    "utwente-outbound".to_string()
}
fn default_max_requests() -> usize {
    4096
}
fn default_max_hosts() -> usize {
    256
}
fn default_dns_timeout() -> u64 {
    5
}
fn default_program() -> String {
    "aclcheck_cmdline.py".to_string()
}
fn default_args() -> Vec<String> {
    [
        "--definitions-directory",
        "{definitions}",
        "--policy-file",
        "{policy}",
        "--protocol",
        "{protocol}",
        "--source",
        "{src}",
        "--source-port",
        "{sport}",
        "--destination",
        "{dst}",
        "--destination-port",
        "{dport}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Resolved configuration (paths expanded, overrides applied).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub policy_dir: PathBuf,
    pub definitions_dir: PathBuf,
    pub utnet_network: String,
    pub inbound_policy: String,
    pub outbound_policy: String,
    pub max_requests: usize,
    pub max_hosts: usize,
    pub dns_timeout: Duration,
    pub evaluator_program: String,
    pub evaluator_args: Vec<String>,
}

impl AppConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(
        config_path: Option<&Path>,
        cli_policy_dir: Option<&str>,
        cli_definitions_dir: Option<&str>,
    ) -> AclResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse_config(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Ok(Self::resolve(file_config, cli_policy_dir, cli_definitions_dir))
    }

    fn resolve(
        file_config: ConfigFile,
        cli_policy_dir: Option<&str>,
        cli_definitions_dir: Option<&str>,
    ) -> Self {
        let base = expand_tilde_str(&file_config.capirca.base);
        let policy_dir = cli_policy_dir
            .map(expand_tilde_str)
            .or_else(|| file_config.capirca.policy_dir.as_deref().map(expand_tilde_str))
            .unwrap_or_else(|| base.join("policies"));
        let definitions_dir = cli_definitions_dir
            .map(expand_tilde_str)
            .or_else(|| {
                file_config
                    .capirca
                    .definitions_dir
                    .as_deref()
                    .map(expand_tilde_str)
            })
            .unwrap_or_else(|| base.join("def"));

        Self {
            policy_dir,
            definitions_dir,
            utnet_network: file_config.utnet.network,
            inbound_policy: file_config.utnet.inbound_policy,
            outbound_policy: file_config.utnet.outbound_policy,
            max_requests: file_config.limits.max_requests,
            max_hosts: file_config.limits.max_hosts,
            dns_timeout: Duration::from_secs(file_config.limits.dns_timeout_secs),
            evaluator_program: file_config.evaluator.program,
            evaluator_args: file_config.evaluator.args,
        }
    }
}

fn parse_config(content: &str) -> AclResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| AclError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
