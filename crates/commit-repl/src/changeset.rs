//! Change set resolution: what a source commit changed, with content.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::RepoClient;
use crate::error::RemoteError;
use crate::outcome::{ReplicationFailure, Stage};
use crate::types::{ChangeSet, CommitId, CommitMetadata, FileChange, RepoId};

/// What to do with paths the source commit deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Leave deleted paths out of the change set; the destination keeps them.
    #[default]
    Omit,
    /// Carry deleted paths so the destination removes them too.
    Propagate,
}

/// A source commit together with its net file changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    /// Source commit metadata.
    pub metadata: CommitMetadata,
    /// Files to write (and delete, under [`DeletionPolicy::Propagate`]).
    pub changes: ChangeSet,
}

/// Resolves a source commit into a [`ChangeSet`] using the source client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeSetResolver {
    policy: DeletionPolicy,
}

impl ChangeSetResolver {
    /// Create a resolver applying `policy` to deletions.
    pub fn new(policy: DeletionPolicy) -> Self {
        Self { policy }
    }

    /// The deletion policy in effect.
    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    /// Fetch `commit`'s metadata, list its differences and fetch the content
    /// of every added or modified file.
    ///
    /// A missing commit fails in [`Stage::FetchMetadata`]; any error while
    /// listing or fetching content fails in [`Stage::ResolveChanges`].
    pub async fn resolve<C: RepoClient + ?Sized>(
        &self,
        source: &C,
        repo: &RepoId,
        commit: &CommitId,
    ) -> Result<ResolvedCommit, ReplicationFailure> {
        let metadata = self.fetch_metadata(source, repo, commit).await?;
        let changes = self.resolve_changes(source, repo, commit).await?;
        Ok(ResolvedCommit { metadata, changes })
    }

    /// Fetch the source commit's metadata.
    pub async fn fetch_metadata<C: RepoClient + ?Sized>(
        &self,
        source: &C,
        repo: &RepoId,
        commit: &CommitId,
    ) -> Result<CommitMetadata, ReplicationFailure> {
        source
            .get_commit(repo, commit)
            .await
            .map_err(|e| ReplicationFailure::remote(Stage::FetchMetadata, &e))
    }

    /// List the commit's differences and fetch post-change content.
    pub async fn resolve_changes<C: RepoClient + ?Sized>(
        &self,
        source: &C,
        repo: &RepoId,
        commit: &CommitId,
    ) -> Result<ChangeSet, ReplicationFailure> {
        self.collect_changes(source, repo, commit)
            .await
            .map_err(|e| ReplicationFailure::remote(Stage::ResolveChanges, &e))
    }

    async fn collect_changes<C: RepoClient + ?Sized>(
        &self,
        source: &C,
        repo: &RepoId,
        commit: &CommitId,
    ) -> Result<ChangeSet, RemoteError> {
        let diff = source.list_changed_paths(repo, commit).await?;
        let mut changes = ChangeSet::new();
        let mut skipped = 0usize;

        for entry in diff {
            if let Some(from) = &entry.renamed_from {
                match self.policy {
                    DeletionPolicy::Propagate => changes.push_deletion(from.clone()),
                    DeletionPolicy::Omit => skipped += 1,
                }
            }
            match entry.after_blob {
                Some(blob) => {
                    let content = source.get_blob(repo, &blob).await?;
                    changes.push_file(FileChange::new(entry.path, content));
                }
                None => match self.policy {
                    DeletionPolicy::Propagate => changes.push_deletion(entry.path),
                    DeletionPolicy::Omit => skipped += 1,
                },
            }
        }

        debug!(
            commit = %commit,
            files = changes.len(),
            deletions = changes.deleted().len(),
            skipped_deletions = skipped,
            "resolved change set"
        );
        Ok(changes)
    }
}
