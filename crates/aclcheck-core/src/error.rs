use thiserror::Error;

/// Errors produced while expanding and checking an aclcheck request.
///
/// The `Display` text of every variant is the bare message, because the CGI
/// layer returns it verbatim as the response body.
#[derive(Debug, Error)]
pub enum AclError {
    /// The request itself is unusable (missing hosts, ports, bad policy name...).
    #[error("{0}")]
    Validation(String),

    /// A hostname lookup failed for a reason other than "no such records".
    #[error("{0}")]
    Resolution(String),

    /// A policy file or network definition does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The external policy evaluator failed.
    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl AclError {
    /// Machine-readable discriminator, sent alongside the text body.
    pub fn code(&self) -> &'static str {
        match self {
            AclError::Validation(_) => "validation",
            AclError::Resolution(_) => "resolution",
            AclError::NotFound(_) => "not_found",
            AclError::Engine(_) => "engine",
            AclError::Config(_) => "config",
            AclError::Io(_) => "io",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        AclError::Validation(msg.into())
    }
}

pub type AclResult<T> = Result<T, AclError>;
