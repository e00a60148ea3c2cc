//! Replication configuration.
//!
//! Source and destination identifiers and endpoints are required and have no
//! defaults. Options can come from a toml/json file and from the command line;
//! later layers override earlier ones. Validation happens before any client
//! is built, so a bad configuration never reaches a remote call.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::changeset::DeletionPolicy;
use crate::client::RepoClient;
use crate::error::ConfigError;
use crate::http::HttpRepoClient;
use crate::memory::MemoryRepoHost;
use crate::replicator::{
    CommitReplicator, EngineConfig, DEFAULT_FALLBACK_AUTHOR_EMAIL, DEFAULT_FALLBACK_AUTHOR_NAME,
    DEFAULT_MESSAGE_PREFIX,
};
use crate::timeout::TimeoutClient;
use crate::types::RepoId;

/// Default bound on each remote call.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// A possibly incomplete set of options, as read from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    /// Source repository name.
    #[serde(default)]
    pub source_repo: Option<String>,
    /// Destination repository name.
    #[serde(default)]
    pub destination_repo: Option<String>,
    /// Source endpoint selector.
    #[serde(default)]
    pub source_endpoint: Option<String>,
    /// Destination endpoint selector.
    #[serde(default)]
    pub destination_endpoint: Option<String>,
    /// Per-call timeout in milliseconds.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Deletion policy.
    #[serde(default)]
    pub deletion_policy: Option<DeletionPolicy>,
    /// Resolve change set and lineage concurrently.
    #[serde(default)]
    pub concurrent_resolve: Option<bool>,
    /// Replicated commit message prefix.
    #[serde(default)]
    pub message_prefix: Option<String>,
    /// Fallback author name.
    #[serde(default)]
    pub fallback_author_name: Option<String>,
    /// Fallback author email.
    #[serde(default)]
    pub fallback_author_email: Option<String>,
}

impl PartialConfig {
    /// Load options from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => Err(ConfigError::UnsupportedFormat { ext: ext.to_string() }),
        }
    }

    /// Overlay `other` on top of `self`; options set in `other` win.
    pub fn merge(self, other: PartialConfig) -> Self {
        Self {
            source_repo: other.source_repo.or(self.source_repo),
            destination_repo: other.destination_repo.or(self.destination_repo),
            source_endpoint: other.source_endpoint.or(self.source_endpoint),
            destination_endpoint: other.destination_endpoint.or(self.destination_endpoint),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            deletion_policy: other.deletion_policy.or(self.deletion_policy),
            concurrent_resolve: other.concurrent_resolve.or(self.concurrent_resolve),
            message_prefix: other.message_prefix.or(self.message_prefix),
            fallback_author_name: other.fallback_author_name.or(self.fallback_author_name),
            fallback_author_email: other.fallback_author_email.or(self.fallback_author_email),
        }
    }

    /// Check required options and produce a complete configuration.
    pub fn build(self) -> Result<ReplConfig, ConfigError> {
        let source_repo = required("source_repo", self.source_repo)?;
        let destination_repo = required("destination_repo", self.destination_repo)?;
        let source_endpoint = Endpoint::parse("source_endpoint", &required("source_endpoint", self.source_endpoint)?)?;
        let destination_endpoint = Endpoint::parse(
            "destination_endpoint",
            &required("destination_endpoint", self.destination_endpoint)?,
        )?;

        let request_timeout_ms = self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        if request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms",
                msg: "must be greater than zero".to_string(),
            });
        }

        Ok(ReplConfig {
            source_repo: RepoId::new(source_repo),
            destination_repo: RepoId::new(destination_repo),
            source_endpoint,
            destination_endpoint,
            request_timeout_ms,
            deletion_policy: self.deletion_policy.unwrap_or_default(),
            concurrent_resolve: self.concurrent_resolve.unwrap_or(false),
            message_prefix: self
                .message_prefix
                .unwrap_or_else(|| DEFAULT_MESSAGE_PREFIX.to_string()),
            fallback_author_name: self
                .fallback_author_name
                .unwrap_or_else(|| DEFAULT_FALLBACK_AUTHOR_NAME.to_string()),
            fallback_author_email: self
                .fallback_author_email
                .unwrap_or_else(|| DEFAULT_FALLBACK_AUTHOR_EMAIL.to_string()),
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        None => Err(ConfigError::Missing { field }),
        Some(v) if v.trim().is_empty() => Err(ConfigError::Empty { field }),
        Some(v) => Ok(v.trim().to_string()),
    }
}

/// Where a repository client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// An in-process host, `memory://<name>`, shared by name within the process.
    Memory(String),
    /// A JSON-over-HTTP service, `http://` or `https://`.
    Http(String),
}

impl Endpoint {
    /// Parse an endpoint selector.
    pub fn parse(field: &'static str, value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidEndpoint {
            field,
            value: value.to_string(),
        };
        if let Some(name) = value.strip_prefix("memory://") {
            if name.is_empty() {
                return Err(invalid());
            }
            return Ok(Endpoint::Memory(name.to_string()));
        }
        if let Some(rest) = value
            .strip_prefix("https://")
            .or_else(|| value.strip_prefix("http://"))
        {
            if rest.is_empty() || rest.starts_with('/') {
                return Err(invalid());
            }
            return Ok(Endpoint::Http(value.to_string()));
        }
        Err(invalid())
    }

    /// Build a client for this endpoint, bounded by `timeout` per call.
    ///
    /// A memory endpoint resolves to the process-wide host registered under
    /// its name (see [`MemoryRepoHost::named`]); endpoints with the same name
    /// share one host. Such hosts only hold what was put there from within
    /// the same process, so they serve embedding and tests rather than
    /// standalone runs.
    pub fn connect(&self, field: &'static str, timeout: Duration) -> Result<Arc<dyn RepoClient>, ConfigError> {
        match self {
            Endpoint::Memory(name) => Ok(Arc::new(TimeoutClient::new(MemoryRepoHost::named(name), timeout))),
            Endpoint::Http(url) => {
                let client = HttpRepoClient::new(url, timeout).map_err(|e| ConfigError::Invalid {
                    field,
                    msg: format!("cannot build client for {}: {}", url, e),
                })?;
                Ok(Arc::new(TimeoutClient::new(client, timeout)))
            }
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Memory(name) => write!(f, "memory://{}", name),
            Endpoint::Http(url) => f.write_str(url),
        }
    }
}

/// Complete, validated replication configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplConfig {
    /// Source repository.
    pub source_repo: RepoId,
    /// Destination repository.
    pub destination_repo: RepoId,
    /// Source region endpoint.
    pub source_endpoint: Endpoint,
    /// Destination region endpoint.
    pub destination_endpoint: Endpoint,
    /// Per-call timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Deletion policy.
    pub deletion_policy: DeletionPolicy,
    /// Resolve change set and lineage concurrently.
    pub concurrent_resolve: bool,
    /// Replicated commit message prefix.
    pub message_prefix: String,
    /// Fallback author name.
    pub fallback_author_name: String,
    /// Fallback author email.
    pub fallback_author_email: String,
}

impl ReplConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        PartialConfig::from_file(path)?.build()
    }

    /// Per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            message_prefix: self.message_prefix.clone(),
            fallback_author_name: self.fallback_author_name.clone(),
            fallback_author_email: self.fallback_author_email.clone(),
            deletion_policy: self.deletion_policy,
            concurrent_resolve: self.concurrent_resolve,
        }
    }

    /// Build both clients and the replicator.
    pub fn build_replicator(&self) -> Result<CommitReplicator, ConfigError> {
        let timeout = self.request_timeout();
        let source = self.source_endpoint.connect("source_endpoint", timeout)?;
        let dest = self.destination_endpoint.connect("destination_endpoint", timeout)?;
        Ok(CommitReplicator::new(source, dest, self.engine_config()))
    }
}
