//! Change-notification decoding.
//!
//! A push on the source repository produces a JSON document whose `detail`
//! carries the commit id and the reference that moved. This turns it into a
//! [`ReplicationRequest`] bound to the configured repositories.

use serde::Deserialize;
use thiserror::Error;

use crate::config::ReplConfig;
use crate::error::ErrorKind;
use crate::outcome::{ReplicationFailure, Stage};
use crate::types::{BranchName, CommitId, ReplicationRequest};

/// Branch used when the notification does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Why a notification could not be turned into a request.
#[derive(Debug, Error)]
pub enum EventError {
    /// The payload is not the expected JSON shape.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload could not be read.
    #[error("reading event: {0}")]
    Io(#[from] std::io::Error),

    /// The payload does not name a commit.
    #[error("event has no commitId")]
    MissingCommit,
}

impl EventError {
    /// Report as a failure that stopped before any remote call.
    pub fn to_failure(&self) -> ReplicationFailure {
        ReplicationFailure {
            stage: Stage::FetchMetadata,
            kind: ErrorKind::Unknown,
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChangeEvent {
    #[serde(default)]
    detail: ChangeDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeDetail {
    #[serde(default)]
    commit_id: Option<String>,
    #[serde(default)]
    reference_name: Option<String>,
    #[serde(default)]
    repository_name: Option<String>,
}

/// Decode a change notification into a replication request.
///
/// The repositories always come from `config`; the event's own repository
/// name is only logged when it differs.
pub fn decode_event(payload: &str, config: &ReplConfig) -> Result<ReplicationRequest, EventError> {
    let event: ChangeEvent = serde_json::from_str(payload)?;
    let detail = event.detail;

    let commit_id = detail
        .commit_id
        .filter(|c| !c.trim().is_empty())
        .ok_or(EventError::MissingCommit)?;

    let branch = detail
        .reference_name
        .as_deref()
        .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r))
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_BRANCH)
        .to_string();

    if let Some(repo) = detail.repository_name.as_deref() {
        if repo != config.source_repo.as_str() {
            tracing::warn!(
                event_repo = repo,
                source_repo = %config.source_repo,
                "event names a different repository than the configured source"
            );
        }
    }

    Ok(ReplicationRequest {
        source_repo: config.source_repo.clone(),
        destination_repo: config.destination_repo.clone(),
        commit_id: CommitId::new(commit_id),
        branch_name: BranchName::new(branch),
    })
}
