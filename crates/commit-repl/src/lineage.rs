//! Destination lineage: which commit the replicated commit should follow.

use tracing::debug;

use crate::client::RepoClient;
use crate::error::RemoteError;
use crate::outcome::{ReplicationFailure, Stage};
use crate::types::{BranchName, LineageState, RepoId};

/// Read the destination branch head.
///
/// A missing branch is the first replication to that branch and resolves to
/// [`LineageState::BranchAbsent`]. Every other error fails in
/// [`Stage::ResolveLineage`].
pub async fn resolve_lineage<C: RepoClient + ?Sized>(
    dest: &C,
    repo: &RepoId,
    branch: &BranchName,
) -> Result<LineageState, ReplicationFailure> {
    match dest.get_branch_head(repo, branch).await {
        Ok(head) => {
            debug!(branch = %branch, head = %head, "destination head resolved");
            Ok(LineageState::HeadKnown(head))
        }
        Err(RemoteError::BranchNotFound { .. }) => {
            debug!(branch = %branch, "destination branch absent");
            Ok(LineageState::BranchAbsent)
        }
        Err(e) => Err(ReplicationFailure::remote(Stage::ResolveLineage, &e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CommitSpec, RemoteOp};
    use crate::error::ErrorKind;
    use crate::memory::MemoryRepoHost;
    use crate::types::{CommitId, FileChange};

    async fn dest() -> (MemoryRepoHost, RepoId) {
        let host = MemoryRepoHost::new("d");
        let repo = RepoId::from("dst");
        host.create_repo(repo.clone()).await;
        (host, repo)
    }

    #[tokio::test]
    async fn test_absent_branch_is_not_a_failure() {
        let (host, repo) = dest().await;
        let state = resolve_lineage(&host, &repo, &"main".into()).await.unwrap();
        assert_eq!(state, LineageState::BranchAbsent);
    }

    #[tokio::test]
    async fn test_existing_branch_head() {
        let (host, repo) = dest().await;
        let spec = CommitSpec {
            branch: "main".into(),
            put_files: vec![FileChange::new("a.txt", "hello")],
            delete_files: vec![],
            message: "init".into(),
            author_name: "Ada".into(),
            author_email: "ada@example.com".into(),
            parent: None,
        };
        host.create_commit(&repo, spec).await.unwrap();
        let state = resolve_lineage(&host, &repo, &"main".into()).await.unwrap();
        assert_eq!(state, LineageState::HeadKnown(CommitId::from("d1")));
    }

    #[tokio::test]
    async fn test_transport_error_fails() {
        let (host, repo) = dest().await;
        host.fail_next(RemoteOp::GetBranchHead, RemoteError::unavailable("timeout")).await;
        let err = resolve_lineage(&host, &repo, &"main".into()).await.unwrap_err();
        assert_eq!(err.stage, Stage::ResolveLineage);
        assert_eq!(err.kind, ErrorKind::RemoteUnavailable);
    }

    #[tokio::test]
    async fn test_missing_repository_fails() {
        let host = MemoryRepoHost::new("d");
        let err = resolve_lineage(&host, &"nope".into(), &"main".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
