//! Deadline enforcement for remote clients.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

use crate::client::{CommitSpec, RemoteOp, RemoteResult, RepoClient};
use crate::error::RemoteError;
use crate::types::{BlobId, BranchName, CommitId, CommitMetadata, DiffEntry, RepoId};

/// Wraps a client so that no call outlives `limit`.
///
/// An elapsed call is reported as [`RemoteError::RemoteUnavailable`].
#[derive(Debug, Clone)]
pub struct TimeoutClient<C> {
    inner: C,
    limit: Duration,
}

impl<C> TimeoutClient<C> {
    /// Bound every call on `inner` by `limit`.
    pub fn new(inner: C, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn bounded<T>(&self, op: RemoteOp, fut: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(RemoteError::unavailable(format!(
                "{} timed out after {}ms",
                op.name(),
                self.limit.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl<C: RepoClient> RepoClient for TimeoutClient<C> {
    async fn get_commit(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<CommitMetadata> {
        self.bounded(RemoteOp::GetCommit, self.inner.get_commit(repo, commit)).await
    }

    async fn list_changed_paths(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<Vec<DiffEntry>> {
        self.bounded(RemoteOp::ListChangedPaths, self.inner.list_changed_paths(repo, commit))
            .await
    }

    async fn get_blob(&self, repo: &RepoId, blob: &BlobId) -> RemoteResult<Bytes> {
        self.bounded(RemoteOp::GetBlob, self.inner.get_blob(repo, blob)).await
    }

    async fn get_branch_head(&self, repo: &RepoId, branch: &BranchName) -> RemoteResult<CommitId> {
        self.bounded(RemoteOp::GetBranchHead, self.inner.get_branch_head(repo, branch))
            .await
    }

    async fn create_commit(&self, repo: &RepoId, spec: CommitSpec) -> RemoteResult<CommitId> {
        self.bounded(RemoteOp::CreateCommit, self.inner.create_commit(repo, spec)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepoHost;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_becomes_unavailable() {
        let host = MemoryRepoHost::new("d");
        host.create_repo("dst").await;
        host.set_latency(RemoteOp::GetBranchHead, Duration::from_secs(60)).await;
        let client = TimeoutClient::new(host, Duration::from_secs(1));

        let err = client
            .get_branch_head(&"dst".into(), &"main".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::RemoteUnavailable { .. }));
        assert!(err.to_string().contains("get_branch_head timed out"));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let host = MemoryRepoHost::new("d");
        host.create_repo("dst").await;
        let client = TimeoutClient::new(host, Duration::from_secs(1));

        let err = client
            .get_branch_head(&"dst".into(), &"main".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::BranchNotFound { .. }));
    }
}
