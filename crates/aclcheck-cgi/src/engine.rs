//! Policy evaluation through an external command.
//!
//! The policy language itself is capirca's business. [`CommandEngine`] runs
//! the configured evaluator (by default `aclcheck_cmdline.py`) once per
//! request and takes its standard output as the verdict.

use crate::store::PolicyDocument;
use aclcheck_core::{AclError, AclResult, EvaluationRequest};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// What the engine says about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: String,
    /// Header comments of the evaluated document, in document order.
    pub comments: Vec<String>,
}

/// Evaluates a 5-tuple against a loaded policy document.
pub trait PolicyEngine {
    fn evaluate(
        &self,
        document: &PolicyDocument,
        request: &EvaluationRequest,
    ) -> impl Future<Output = AclResult<Evaluation>> + Send;
}

/// Runs an external evaluator program with templated arguments.
///
/// Placeholders: `{policy}` (policy file path), `{definitions}`,
/// `{protocol}`, `{src}`, `{sport}`, `{dst}`, `{dport}`. Wildcard addresses
/// are passed as `any`, absent ports as `0`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    definitions_dir: PathBuf,
}

impl CommandEngine {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        definitions_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            definitions_dir: definitions_dir.into(),
        }
    }

    fn render_args(&self, document: &PolicyDocument, request: &EvaluationRequest) -> Vec<String> {
        let policy = document.path.display().to_string();
        let definitions = self.definitions_dir.display().to_string();
        let src = request.src.to_string();
        let dst = request.dst.to_string();
        let sport = request.sport.unwrap_or(0).to_string();
        let dport = request.dport.unwrap_or(0).to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{policy}", &policy)
                    .replace("{definitions}", &definitions)
                    .replace("{protocol}", &request.protocol)
                    .replace("{src}", &src)
                    .replace("{sport}", &sport)
                    .replace("{dst}", &dst)
                    .replace("{dport}", &dport)
            })
            .collect()
    }
}

impl PolicyEngine for CommandEngine {
    async fn evaluate(
        &self,
        document: &PolicyDocument,
        request: &EvaluationRequest,
    ) -> AclResult<Evaluation> {
        let args = self.render_args(document, request);
        debug!(program = %self.program, ?args, "running evaluator");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AclError::Engine(format!("cannot run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(policy = %document.name, status = %output.status, "evaluator failed");
            return Err(AclError::Engine(format!(
                "Policy evaluation failed for {}: {}",
                document.name,
                stderr.trim()
            )));
        }

        Ok(Evaluation {
            verdict: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            comments: document.header_comments(),
        })
    }
}
