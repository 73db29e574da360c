//! CGI transport: form parameter decoding and JSON response framing.

use aclcheck_core::{AclError, AclResult};
use serde_json::Value;
use std::collections::HashMap;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Upper bound on a POST body; the forms this endpoint serves are tiny.
const MAX_BODY: usize = 64 * 1024;

/// Decoded request parameters.
///
/// Blank values are dropped, so an empty form field reads the same as a
/// missing one. When a key repeats, the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    /// Parse an `application/x-www-form-urlencoded` string.
    pub fn parse(encoded: &str) -> Self {
        let mut params = Self::default();
        params.extend_from(encoded);
        params
    }

    fn extend_from(&mut self, encoded: &str) {
        for pair in encoded.split(['&', ';']) {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            let value = decode_component(value);
            if key.is_empty() || value.is_empty() {
                continue;
            }
            self.values.entry(key).or_insert(value);
        }
    }

    /// Read parameters the way a CGI server hands them over: the POST body
    /// (if any) followed by `QUERY_STRING`.
    pub async fn from_env() -> AclResult<Self> {
        let mut params = Self::default();
        let method = std::env::var("REQUEST_METHOD").unwrap_or_default();
        if method.eq_ignore_ascii_case("POST") {
            let length: usize = std::env::var("CONTENT_LENGTH")
                .ok()
                .and_then(|l| l.trim().parse().ok())
                .unwrap_or(0);
            if length > MAX_BODY {
                return Err(AclError::Validation(format!(
                    "Request body too large ({length} bytes)."
                )));
            }
            let mut body = vec![0u8; length];
            tokio::io::stdin().read_exact(&mut body).await?;
            params.extend_from(&String::from_utf8_lossy(&body));
        }
        if let Ok(query) = std::env::var("QUERY_STRING") {
            params.extend_from(&query);
        }
        debug!(method = %method, keys = params.values.len(), "decoded CGI parameters");
        Ok(params)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
        }
    }
}

/// A complete CGI response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub body: Value,
    /// Machine-readable error kind, present only on failure.
    pub error_code: Option<&'static str>,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self {
            body,
            error_code: None,
        }
    }

    /// Failures keep the historical contract: the body is the error text as a
    /// JSON string. The kind travels in a separate header.
    pub fn error(error: &AclError) -> Self {
        Self {
            body: Value::String(error.to_string()),
            error_code: Some(error.code()),
        }
    }

    /// Headers, blank line, JSON body.
    pub fn render(&self) -> String {
        let mut out = String::from("Content-type: application/json\n");
        if let Some(code) = self.error_code {
            out.push_str("X-Aclcheck-Error: ");
            out.push_str(code);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body.to_string());
        out.push('\n');
        out
    }
}
