//! aclcheck-cgi: checks traffic against capirca policies.
//!
//! Runs once per HTTP request under a CGI server. Parameters come from the
//! POST body and `QUERY_STRING` (or `--query` when run by hand); the JSON
//! response goes to stdout, logs go to stderr.

mod cgi;
mod checker;
mod config;
mod definitions;
mod engine;
mod orchestrator;
mod resolver;
mod store;

use anyhow::Context;
use cgi::{Params, Response};
use checker::PolicyChecker;
use clap::Parser;
use config::AppConfig;
use engine::CommandEngine;
use orchestrator::{Orchestrator, RequestLimits, UtnetSettings};
use resolver::DnsResolver;
use std::io::Write;
use std::path::PathBuf;
use store::PolicyStore;
use tracing::{error, info};

/// aclcheck-cgi: capirca policy checker
#[derive(Parser, Debug)]
#[command(name = "aclcheck-cgi", version, about = "Check traffic against capirca policies")]
struct Cli {
    /// Config file path
    #[arg(long, env = "ACLCHECK_CONFIG", default_value = "/etc/aclcheck/config.toml")]
    config: String,

    /// Policy directory (overrides the config file)
    #[arg(long)]
    policy_dir: Option<String>,

    /// Definitions directory (overrides the config file)
    #[arg(long)]
    definitions_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ACLCHECK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Form-encoded parameters to use instead of the CGI environment
    #[arg(long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let response = match run(&cli).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = format!("{e:#}"), "request setup failed");
            let response = match e.downcast_ref::<aclcheck_core::AclError>() {
                Some(acl) => Response::error(acl),
                None => Response::error(&aclcheck_core::AclError::Config(format!("{e:#}"))),
            };
            emit(&response);
            std::process::exit(1);
        }
    };
    emit(&response);
}

async fn run(cli: &Cli) -> anyhow::Result<Response> {
    let config_path = PathBuf::from(&cli.config);
    let config = AppConfig::load(
        Some(&config_path),
        cli.policy_dir.as_deref(),
        cli.definitions_dir.as_deref(),
    )
    .context("failed to load config")?;

    let params = match &cli.query {
        Some(query) => Params::parse(query),
        None => Params::from_env().await.context("failed to read request")?,
    };

    let store = PolicyStore::new(&config.policy_dir, &config.definitions_dir);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        policies = %store.policy_dir().display(),
        definitions = %store.definitions_dir().display(),
        "starting aclcheck-cgi"
    );

    let engine = CommandEngine::new(
        config.evaluator_program,
        config.evaluator_args,
        config.definitions_dir,
    );
    let orchestrator = Orchestrator::new(
        DnsResolver::from_system(config.dns_timeout),
        PolicyChecker::new(store, engine),
        UtnetSettings {
            network: config.utnet_network,
            inbound_policy: config.inbound_policy,
            outbound_policy: config.outbound_policy,
        },
        RequestLimits {
            max_requests: config.max_requests,
            max_hosts: config.max_hosts,
        },
    );

    Ok(orchestrator.handle(&params).await)
}

fn emit(response: &Response) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout
        .write_all(response.render().as_bytes())
        .and_then(|()| stdout.flush())
    {
        error!(error = %e, "failed to write response");
    }
}
