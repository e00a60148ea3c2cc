//! The commit replicator: resolves a source commit and its destination
//! lineage, then submits one atomic commit on the destination.
//!
//! Each call runs `Start -> MetadataFetched -> ChangesResolved ->
//! LineageResolved -> Submitted` and ends in exactly one
//! [`ReplicationResult`]. Nothing is retried or rolled back here; a failed
//! attempt is discarded whole and the caller decides whether to start over.

use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::changeset::{ChangeSetResolver, DeletionPolicy, ResolvedCommit};
use crate::client::{CommitSpec, RepoClient};
use crate::error::ErrorKind;
use crate::lineage::resolve_lineage;
use crate::outcome::{ReplicationFailure, ReplicationResult, Stage};
use crate::types::{ChangeSet, CommitMetadata, LineageState, ReplicationRequest};

/// Prefix prepended to every replicated commit message.
pub const DEFAULT_MESSAGE_PREFIX: &str = "[Replicated] ";
/// Author name used when the source commit has none.
pub const DEFAULT_FALLBACK_AUTHOR_NAME: &str = "Replication Lambda";
/// Author email used when the source commit has none.
pub const DEFAULT_FALLBACK_AUTHOR_EMAIL: &str = "noreply@aws.com";

/// Configuration for the replicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Prefix for replicated commit messages.
    pub message_prefix: String,
    /// Author name when the source provided none.
    pub fallback_author_name: String,
    /// Author email when the source provided none.
    pub fallback_author_email: String,
    /// Whether source deletions reach the destination.
    pub deletion_policy: DeletionPolicy,
    /// Resolve the change set and the destination lineage concurrently.
    pub concurrent_resolve: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_prefix: DEFAULT_MESSAGE_PREFIX.to_string(),
            fallback_author_name: DEFAULT_FALLBACK_AUTHOR_NAME.to_string(),
            fallback_author_email: DEFAULT_FALLBACK_AUTHOR_EMAIL.to_string(),
            deletion_policy: DeletionPolicy::Omit,
            concurrent_resolve: false,
        }
    }
}

impl EngineConfig {
    /// Build the destination commit for a resolved source commit.
    ///
    /// The change set is consumed; it does not outlive the attempt.
    pub fn assemble(
        &self,
        request: &ReplicationRequest,
        metadata: &CommitMetadata,
        changes: ChangeSet,
        lineage: &LineageState,
    ) -> CommitSpec {
        let (put_files, delete_files) = changes.into_parts();
        CommitSpec {
            branch: request.branch_name.clone(),
            put_files,
            delete_files,
            message: format!("{}{}", self.message_prefix, metadata.message),
            author_name: non_blank(&metadata.author_name).unwrap_or(&self.fallback_author_name).to_string(),
            author_email: non_blank(&metadata.author_email)
                .unwrap_or(&self.fallback_author_email)
                .to_string(),
            parent: lineage.parent().cloned(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Where a replication attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPhase {
    /// Nothing read yet.
    Start,
    /// Source commit metadata is known.
    MetadataFetched,
    /// The change set is known.
    ChangesResolved,
    /// The destination parent (or its absence) is known.
    LineageResolved,
    /// The commit was handed to the destination.
    Submitted,
}

/// Replicate one source commit onto the destination branch.
pub async fn replicate<S, D>(
    source: &S,
    dest: &D,
    config: &EngineConfig,
    request: &ReplicationRequest,
) -> ReplicationResult
where
    S: RepoClient + ?Sized,
    D: RepoClient + ?Sized,
{
    let span = info_span!(
        "replicate",
        source_repo = %request.source_repo,
        destination_repo = %request.destination_repo,
        source_commit = %request.commit_id,
        branch = %request.branch_name,
    );
    let result = run(source, dest, config, request).instrument(span.clone()).await;
    span.in_scope(|| match &result {
        ReplicationResult::Success { new_commit_id, .. } => {
            info!(destination_commit = %new_commit_id, "replication succeeded");
        }
        ReplicationResult::Failure(f) => match f.kind {
            ErrorKind::Conflict | ErrorKind::RemoteUnavailable => {
                warn!(stage = %f.stage, kind = %f.kind, "replication failed: {}", f.message);
            }
            _ => {
                error!(stage = %f.stage, kind = %f.kind, "replication failed: {}", f.message);
            }
        },
    });
    result
}

async fn run<S, D>(source: &S, dest: &D, config: &EngineConfig, request: &ReplicationRequest) -> ReplicationResult
where
    S: RepoClient + ?Sized,
    D: RepoClient + ?Sized,
{
    let resolver = ChangeSetResolver::new(config.deletion_policy);
    let repo = &request.source_repo;
    let commit = &request.commit_id;
    debug!(phase = ?ReplicationPhase::Start, "starting replication");

    let (resolved, lineage) = if config.concurrent_resolve {
        let (resolved, lineage) = tokio::join!(
            resolver.resolve(source, repo, commit),
            resolve_lineage(dest, &request.destination_repo, &request.branch_name),
        );
        // Source-side failures come first in stage order.
        let resolved = match resolved {
            Ok(r) => r,
            Err(f) => return ReplicationResult::Failure(f),
        };
        let lineage = match lineage {
            Ok(l) => l,
            Err(f) => return ReplicationResult::Failure(f),
        };
        debug!(phase = ?ReplicationPhase::LineageResolved, "resolved change set and lineage concurrently");
        (resolved, lineage)
    } else {
        let metadata = match resolver.fetch_metadata(source, repo, commit).await {
            Ok(m) => m,
            Err(f) => return ReplicationResult::Failure(f),
        };
        debug!(phase = ?ReplicationPhase::MetadataFetched, message = %metadata.message);

        let changes = match resolver.resolve_changes(source, repo, commit).await {
            Ok(c) => c,
            Err(f) => return ReplicationResult::Failure(f),
        };
        debug!(phase = ?ReplicationPhase::ChangesResolved, files = changes.len());

        let lineage = match resolve_lineage(dest, &request.destination_repo, &request.branch_name).await {
            Ok(l) => l,
            Err(f) => return ReplicationResult::Failure(f),
        };
        debug!(phase = ?ReplicationPhase::LineageResolved, parent = ?lineage.parent());
        (ResolvedCommit { metadata, changes }, lineage)
    };

    if resolved.changes.is_empty() {
        warn!("source commit has no replicable changes; submitting anyway");
    }

    let spec = config.assemble(request, &resolved.metadata, resolved.changes, &lineage);
    let submitted = dest.create_commit(&request.destination_repo, spec).await;
    debug!(phase = ?ReplicationPhase::Submitted, ok = submitted.is_ok());

    match submitted {
        Ok(new_commit_id) => ReplicationResult::Success {
            new_commit_id,
            source_commit_id: request.commit_id.clone(),
        },
        Err(e) => ReplicationResult::Failure(ReplicationFailure::remote(Stage::SubmitCommit, &e)),
    }
}

/// A replicator bound to one source and one destination client.
#[derive(Clone)]
pub struct CommitReplicator {
    source: Arc<dyn RepoClient>,
    dest: Arc<dyn RepoClient>,
    config: EngineConfig,
}

impl CommitReplicator {
    /// Create a replicator over the given clients.
    pub fn new(source: Arc<dyn RepoClient>, dest: Arc<dyn RepoClient>, config: EngineConfig) -> Self {
        Self { source, dest, config }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replicate `request`. Always terminates in Success or Failure.
    pub async fn replicate(&self, request: &ReplicationRequest) -> ReplicationResult {
        replicate(self.source.as_ref(), self.dest.as_ref(), &self.config, request).await
    }
}

impl std::fmt::Debug for CommitReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitReplicator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
