//! Error types for the commit replication engine.
//!
//! Remote clients return [`RemoteError`]; the engine classifies it into an
//! [`ErrorKind`] and tags it with the [`Stage`](crate::outcome::Stage) in
//! which it happened. Configuration problems are [`ConfigError`] and are
//! raised before any remote call is made.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a remote repository client operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The requested commit does not exist in the repository.
    #[error("commit not found: {commit_id}")]
    CommitNotFound {
        /// The commit identifier that was looked up.
        commit_id: String,
    },

    /// The requested branch does not exist in the repository.
    #[error("branch not found: {branch}")]
    BranchNotFound {
        /// The branch name that was looked up.
        branch: String,
    },

    /// A blob or other addressed object does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing object.
        what: String,
    },

    /// The submitted parent commit is no longer the branch head.
    #[error("conflict: {msg}")]
    Conflict {
        /// Error message from the destination.
        msg: String,
    },

    /// The destination refused the request as invalid.
    #[error("rejected: {msg}")]
    Rejected {
        /// Validation message from the destination.
        msg: String,
    },

    /// Transport failure or timeout talking to the remote service.
    #[error("remote unavailable: {msg}")]
    RemoteUnavailable {
        /// Error message describing the transport issue.
        msg: String,
    },

    /// Unclassified remote error; the original message is kept verbatim.
    #[error("{msg}")]
    Unknown {
        /// The original error message.
        msg: String,
    },
}

impl RemoteError {
    /// Classify this error into the engine's taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::CommitNotFound { .. } => ErrorKind::CommitNotFound,
            RemoteError::BranchNotFound { .. } => ErrorKind::BranchNotFound,
            RemoteError::NotFound { .. } => ErrorKind::NotFound,
            RemoteError::Conflict { .. } => ErrorKind::Conflict,
            RemoteError::Rejected { .. } => ErrorKind::Rejected,
            RemoteError::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            RemoteError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Shorthand for a transport failure.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        RemoteError::RemoteUnavailable { msg: msg.into() }
    }

    /// Shorthand for an unclassified failure.
    pub fn unknown(msg: impl Into<String>) -> Self {
        RemoteError::Unknown { msg: msg.into() }
    }
}

/// Classification of a replication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Source commit does not exist.
    CommitNotFound,
    /// Destination branch does not exist. Normally turned into a lineage state.
    BranchNotFound,
    /// Blob does not exist.
    NotFound,
    /// Stale destination parent.
    Conflict,
    /// Destination validation failure.
    Rejected,
    /// Transport failure or timeout.
    RemoteUnavailable,
    /// Missing or malformed configuration.
    ConfigurationError,
    /// Unclassified remote error.
    Unknown,
}

impl ErrorKind {
    /// Stable name used in the outward payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CommitNotFound => "CommitNotFound",
            ErrorKind::BranchNotFound => "BranchNotFound",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Rejected => "Rejected",
            ErrorKind::RemoteUnavailable => "RemoteUnavailable",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option was not provided.
    #[error("missing required option: {field}")]
    Missing {
        /// Name of the option.
        field: &'static str,
    },

    /// A required option was provided but blank.
    #[error("option must not be empty: {field}")]
    Empty {
        /// Name of the option.
        field: &'static str,
    },

    /// An endpoint selector is not a recognized scheme.
    #[error("invalid endpoint for {field}: {value}")]
    InvalidEndpoint {
        /// Name of the option.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// An option has a value that cannot be used.
    #[error("invalid {field}: {msg}")]
    Invalid {
        /// Name of the option.
        field: &'static str,
        /// Why the value was refused.
        msg: String,
    },

    /// The config file extension is not toml or json.
    #[error("unsupported config file extension: {ext}")]
    UnsupportedFormat {
        /// The file extension that was seen.
        ext: String,
    },

    /// Reading the config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Configuration errors always classify as [`ErrorKind::ConfigurationError`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigurationError
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
