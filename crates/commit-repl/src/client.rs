//! Remote repository client interface.
//!
//! This module defines the [`RepoClient`] trait that every repository host
//! adapter implements. The engine holds two instances, one bound to the source
//! region and one to the destination.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::types::{BlobId, BranchName, CommitId, CommitMetadata, DiffEntry, FileChange, RepoId};

/// Result alias for remote client calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The operations a remote client exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `get_commit`.
    GetCommit,
    /// `list_changed_paths`.
    ListChangedPaths,
    /// `get_blob`.
    GetBlob,
    /// `get_branch_head`.
    GetBranchHead,
    /// `create_commit`.
    CreateCommit,
}

impl RemoteOp {
    /// Operation name as used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteOp::GetCommit => "get_commit",
            RemoteOp::ListChangedPaths => "list_changed_paths",
            RemoteOp::GetBlob => "get_blob",
            RemoteOp::GetBranchHead => "get_branch_head",
            RemoteOp::CreateCommit => "create_commit",
        }
    }
}

/// A multi-file commit to create atomically on a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSpec {
    /// Branch to advance (created if absent and `parent` is `None`).
    pub branch: BranchName,
    /// Files to write.
    pub put_files: Vec<FileChange>,
    /// Paths to delete.
    pub delete_files: Vec<String>,
    /// Commit message.
    pub message: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Expected current head of `branch`; `None` creates the branch.
    pub parent: Option<CommitId>,
}

/// Read/write operations exposed by a hosted version-control service.
///
/// Implementations classify their own failures into [`RemoteError`] and are
/// responsible for bounding every call in time.
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Fetch the metadata of a commit.
    async fn get_commit(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<CommitMetadata>;

    /// List path differences introduced by `commit` relative to its parent
    /// (or the empty tree for a root commit), in the order the host reports.
    async fn list_changed_paths(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<Vec<DiffEntry>>;

    /// Fetch raw blob content.
    async fn get_blob(&self, repo: &RepoId, blob: &BlobId) -> RemoteResult<Bytes>;

    /// Current head commit of a branch. Missing branches are `BranchNotFound`.
    async fn get_branch_head(&self, repo: &RepoId, branch: &BranchName) -> RemoteResult<CommitId>;

    /// Atomically create a commit. A stale `parent` is `Conflict`.
    async fn create_commit(&self, repo: &RepoId, spec: CommitSpec) -> RemoteResult<CommitId>;
}

#[async_trait]
impl<C: RepoClient + ?Sized> RepoClient for Arc<C> {
    async fn get_commit(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<CommitMetadata> {
        (**self).get_commit(repo, commit).await
    }

    async fn list_changed_paths(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<Vec<DiffEntry>> {
        (**self).list_changed_paths(repo, commit).await
    }

    async fn get_blob(&self, repo: &RepoId, blob: &BlobId) -> RemoteResult<Bytes> {
        (**self).get_blob(repo, blob).await
    }

    async fn get_branch_head(&self, repo: &RepoId, branch: &BranchName) -> RemoteResult<CommitId> {
        (**self).get_branch_head(repo, branch).await
    }

    async fn create_commit(&self, repo: &RepoId, spec: CommitSpec) -> RemoteResult<CommitId> {
        (**self).create_commit(repo, spec).await
    }
}
