//! Policy store: lists and loads `*.pol` files and resolves named networks.
//!
//! Nothing is cached; each CGI invocation reads the files it needs afresh.

use crate::definitions::Definitions;
use aclcheck_core::{AclError, AclResult, NamedNetwork};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const POLICY_EXTENSION: &str = "pol";
const NETWORK_EXTENSION: &str = "net";

/// A policy file as loaded from disk.
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
}

impl PolicyDocument {
    /// Comment lines of every `header { ... }` block, in document order.
    ///
    /// Reads `comment:: "..."` attributes only; a quoted comment spanning
    /// several lines yields one entry per line.
    pub fn header_comments(&self) -> Vec<String> {
        let mut comments = Vec::new();
        let mut rest = self.source.as_str();
        while let Some(body) = next_header_body(&mut rest) {
            collect_comments(body, &mut comments);
        }
        comments
    }
}

/// Advance `rest` past the next `header { ... }` block and return its body.
fn next_header_body<'a>(rest: &mut &'a str) -> Option<&'a str> {
    loop {
        let text: &'a str = *rest;
        let at = find_keyword(text, "header")?;
        let after = text[at + "header".len()..].trim_start();
        if let Some(body_start) = after.strip_prefix('{') {
            let end = block_end(body_start)?;
            *rest = &body_start[end + 1..];
            return Some(&body_start[..end]);
        }
        *rest = &text[at + "header".len()..];
    }
}

/// Index of `keyword` as a whole word outside comments and quotes.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut in_comment = false;
    for (i, c) in text.char_indices() {
        match c {
            '\n' => in_comment = false,
            _ if in_comment => {}
            '#' if !in_quote => in_comment = true,
            '"' => in_quote = !in_quote,
            _ if !in_quote && text[i..].starts_with(keyword) => {
                let before_ok = text[..i]
                    .chars()
                    .next_back()
                    .map_or(true, |b| !b.is_alphanumeric() && b != '_');
                let after_ok = text[i + keyword.len()..]
                    .chars()
                    .next()
                    .map_or(true, |a| !a.is_alphanumeric() && a != '_');
                if before_ok && after_ok {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the `}` closing a block whose `{` has just been consumed.
fn block_end(body: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut in_comment = false;
    for (i, c) in body.char_indices() {
        match c {
            '\n' => in_comment = false,
            _ if in_comment => {}
            '#' if !in_quote => in_comment = true,
            '"' => in_quote = !in_quote,
            '}' if !in_quote => return Some(i),
            _ => {}
        }
    }
    None
}

fn collect_comments(body: &str, out: &mut Vec<String>) {
    let mut rest = body;
    while let Some(at) = find_keyword(rest, "comment") {
        rest = &rest[at + "comment".len()..];
        let Some(value) = rest.trim_start().strip_prefix("::") else {
            continue;
        };
        let Some(quoted) = value.trim_start().strip_prefix('"') else {
            continue;
        };
        let Some(close) = quoted.find('"') else {
            break;
        };
        out.extend(quoted[..close].lines().map(|line| line.trim().to_string()));
        rest = &quoted[close + 1..];
    }
}

/// Filesystem-backed access to capirca policies and definitions.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    policy_dir: PathBuf,
    definitions_dir: PathBuf,
}

impl PolicyStore {
    pub fn new(policy_dir: impl Into<PathBuf>, definitions_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy_dir: policy_dir.into(),
            definitions_dir: definitions_dir.into(),
        }
    }

    pub fn policy_dir(&self) -> &Path {
        &self.policy_dir
    }

    pub fn definitions_dir(&self) -> &Path {
        &self.definitions_dir
    }

    /// Names of all policies (file stems of `*.pol`), sorted. A missing
    /// policy directory lists as empty.
    pub async fn list_policies(&self) -> AclResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.policy_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.policy_dir.display(), "policy directory does not exist");
                return Ok(names);
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(POLICY_EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        debug!(count = names.len(), "listed policies");
        Ok(names)
    }

    /// Path of policy `name`, which must sit directly in the policy directory.
    pub fn policy_path(&self, name: &str) -> AclResult<PathBuf> {
        let path = self.policy_dir.join(format!("{name}.{POLICY_EXTENSION}"));
        if path.parent() != Some(self.policy_dir.as_path()) {
            return Err(AclError::Validation(
                "Policy path does not exist within policy directory.".into(),
            ));
        }
        Ok(path)
    }

    /// Read policy `name` from disk.
    pub async fn load_policy(&self, name: &str) -> AclResult<PolicyDocument> {
        let path = self.policy_path(name)?;
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AclError::NotFound(format!("Policy file not found: {name}")))
            }
            Err(e) => return Err(e.into()),
        };
        info!(policy = %name, path = %path.display(), "loaded policy");
        Ok(PolicyDocument {
            name: name.to_string(),
            path,
            source,
        })
    }

    /// Read every `*.net` definitions file.
    pub async fn load_definitions(&self) -> AclResult<Definitions> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.definitions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(NETWORK_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();

        let mut definitions = Definitions::default();
        for path in files {
            let content = tokio::fs::read_to_string(&path).await?;
            definitions.parse_networks(&content);
        }
        Ok(definitions)
    }

    /// Resolve a symbolic network name (e.g. `UTNET`) to its CIDR ranges.
    pub async fn resolve_named_network(&self, name: &str) -> AclResult<NamedNetwork> {
        let ranges = self.load_definitions().await?.network(name)?;
        debug!(network = %name, ranges = ranges.len(), "resolved named network");
        Ok(NamedNetwork::new(name, ranges))
    }
}
