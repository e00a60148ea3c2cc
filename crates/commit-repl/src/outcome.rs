//! Replication outcomes and their outward representation.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ConfigError, ErrorKind, RemoteError};
use crate::types::CommitId;

/// Phase of a replication attempt in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Reading the source commit's metadata.
    FetchMetadata,
    /// Listing changed paths and fetching their content.
    ResolveChanges,
    /// Reading the destination branch head.
    ResolveLineage,
    /// Creating the commit on the destination.
    SubmitCommit,
}

impl Stage {
    /// Stable name used in the outward payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchMetadata => "FetchMetadata",
            Stage::ResolveChanges => "ResolveChanges",
            Stage::ResolveLineage => "ResolveLineage",
            Stage::SubmitCommit => "SubmitCommit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, tagged with the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationFailure {
    /// Where the attempt stopped.
    pub stage: Stage,
    /// What kind of failure it was.
    pub kind: ErrorKind,
    /// Original error message, for diagnostics.
    pub message: String,
}

impl ReplicationFailure {
    /// Build a failure from a remote error raised during `stage`.
    pub fn remote(stage: Stage, err: &RemoteError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Build a failure from a configuration problem detected before `stage`.
    pub fn config(stage: Stage, err: &ConfigError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ReplicationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({}): {}", self.stage, self.kind, self.message)
    }
}

/// Terminal result of one replication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationResult {
    /// The destination now has a new commit replicating the source commit.
    Success {
        /// Commit created on the destination.
        new_commit_id: CommitId,
        /// Commit that was replicated.
        source_commit_id: CommitId,
    },
    /// The attempt stopped; nothing past `stage` was attempted.
    Failure(ReplicationFailure),
}

impl ReplicationResult {
    /// True for [`ReplicationResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, ReplicationResult::Success { .. })
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&ReplicationFailure> {
        match self {
            ReplicationResult::Failure(f) => Some(f),
            ReplicationResult::Success { .. } => None,
        }
    }

    /// Encode as a status code plus JSON body for the triggering infrastructure.
    pub fn to_response(&self) -> InvocationResponse {
        match self {
            ReplicationResult::Success {
                new_commit_id,
                source_commit_id,
            } => InvocationResponse {
                status_code: 200,
                body: json!({
                    "message": "Replication successful",
                    "sourceCommit": source_commit_id,
                    "destinationCommit": new_commit_id,
                }),
            },
            ReplicationResult::Failure(f) => InvocationResponse {
                status_code: 500,
                body: json!({
                    "message": "Replication failed",
                    "stage": f.stage,
                    "error": f.kind,
                    "detail": f.message,
                }),
            },
        }
    }
}

/// What the engine hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// 200 on success, 500 on failure.
    pub status_code: u16,
    /// JSON payload.
    pub body: serde_json::Value,
}
