//! Test Harness - two in-memory regions wired to a replicator

use anyhow::{anyhow, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use commit_repl::{
    BranchName, CommitId, CommitReplicator, CommitSpec, EngineConfig, FileChange, MemoryRepoHost,
    ReplicationRequest, ReplicationResult, RepoClient, RepoId, TimeoutClient,
};

/// Source repository name used by every harness.
pub const SOURCE_REPO: &str = "src";
/// Destination repository name used by every harness.
pub const DEST_REPO: &str = "dst";

/// A source region (commit ids `c1, c2, ...`) and a destination region
/// (commit ids `d1, d2, ...`), each holding one repository.
#[derive(Debug, Clone)]
pub struct ReplicationHarness {
    pub source: MemoryRepoHost,
    pub dest: MemoryRepoHost,
    pub source_repo: RepoId,
    pub dest_repo: RepoId,
    pub branch: BranchName,
    config: EngineConfig,
    timeout: Option<Duration>,
}

impl ReplicationHarness {
    pub async fn new() -> Self {
        let source = MemoryRepoHost::new("c");
        let dest = MemoryRepoHost::new("d");
        source.create_repo(SOURCE_REPO).await;
        dest.create_repo(DEST_REPO).await;
        Self {
            source,
            dest,
            source_repo: SOURCE_REPO.into(),
            dest_repo: DEST_REPO.into(),
            branch: "main".into(),
            config: EngineConfig::default(),
            timeout: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound every remote call on both sides by `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Commit `files` on the source branch and return the new commit id.
    pub async fn commit_source(&self, message: &str, files: &[(&str, &str)]) -> Result<CommitId> {
        self.submit_source(message, files, &[]).await
    }

    /// Delete `paths` on the source branch and return the new commit id.
    pub async fn delete_source(&self, message: &str, paths: &[&str]) -> Result<CommitId> {
        self.submit_source(message, &[], paths).await
    }

    async fn submit_source(&self, message: &str, files: &[(&str, &str)], deletes: &[&str]) -> Result<CommitId> {
        let parent = self.source.branch_head(&self.source_repo, &self.branch).await;
        let spec = CommitSpec {
            branch: self.branch.clone(),
            put_files: files
                .iter()
                .map(|(path, content)| FileChange::new(*path, content.to_string()))
                .collect(),
            delete_files: deletes.iter().map(|p| p.to_string()).collect(),
            message: message.to_string(),
            author_name: "Ada Lovelace".to_string(),
            author_email: "ada@example.com".to_string(),
            parent,
        };
        self.source
            .create_commit(&self.source_repo, spec)
            .await
            .map_err(|e| anyhow!("source commit failed: {}", e))
    }

    pub fn request(&self, commit: &CommitId) -> ReplicationRequest {
        ReplicationRequest {
            source_repo: self.source_repo.clone(),
            destination_repo: self.dest_repo.clone(),
            commit_id: commit.clone(),
            branch_name: self.branch.clone(),
        }
    }

    pub fn replicator(&self) -> CommitReplicator {
        let (source, dest): (Arc<dyn RepoClient>, Arc<dyn RepoClient>) = match self.timeout {
            Some(limit) => (
                Arc::new(TimeoutClient::new(self.source.clone(), limit)),
                Arc::new(TimeoutClient::new(self.dest.clone(), limit)),
            ),
            None => (Arc::new(self.source.clone()), Arc::new(self.dest.clone())),
        };
        CommitReplicator::new(source, dest, self.config.clone())
    }

    pub async fn replicate(&self, commit: &CommitId) -> ReplicationResult {
        self.replicator().replicate(&self.request(commit)).await
    }

    pub async fn dest_head(&self) -> Option<CommitId> {
        self.dest.branch_head(&self.dest_repo, &self.branch).await
    }

    pub async fn dest_file(&self, commit: &CommitId, path: &str) -> Option<Bytes> {
        self.dest.read_file(&self.dest_repo, commit, path).await
    }

    pub async fn dest_paths(&self, commit: &CommitId) -> Vec<String> {
        self.dest.paths_at(&self.dest_repo, commit).await
    }

    pub async fn dest_parents(&self, commit: &CommitId) -> Option<Vec<CommitId>> {
        self.dest.parents_of(&self.dest_repo, commit).await
    }
}

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
