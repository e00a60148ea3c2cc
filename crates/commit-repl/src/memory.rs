//! In-process repository host.
//!
//! Backs `memory://` endpoints and the test suites. Commits are full content
//! snapshots with parent pointers; `create_commit` enforces the same
//! optimistic concurrency a hosted service applies: the submitted parent must
//! match the current branch head. Faults and latency can be injected per
//! operation to simulate a misbehaving region.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::client::{CommitSpec, RemoteOp, RemoteResult, RepoClient};
use crate::error::RemoteError;
use crate::types::{BlobId, BranchName, CommitId, CommitMetadata, DiffEntry, RepoId};

#[derive(Debug, Clone)]
struct StoredCommit {
    meta: CommitMetadata,
    tree: BTreeMap<String, BlobId>,
    diff: Vec<DiffEntry>,
}

#[derive(Debug, Default)]
struct RepoState {
    commits: HashMap<CommitId, StoredCommit>,
    blobs: HashMap<BlobId, Bytes>,
    branches: HashMap<BranchName, CommitId>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<RepoId, RepoState>,
    faults: HashMap<RemoteOp, VecDeque<RemoteError>>,
    latency: HashMap<RemoteOp, Duration>,
    next_commit: u64,
    next_blob: u64,
}

static NAMED_HOSTS: OnceLock<std::sync::Mutex<HashMap<String, MemoryRepoHost>>> = OnceLock::new();

/// An in-memory repository host for one region.
///
/// Cloning yields another handle to the same host.
#[derive(Debug, Clone)]
pub struct MemoryRepoHost {
    id_prefix: String,
    state: Arc<Mutex<HostState>>,
    create_calls: Arc<AtomicU64>,
}

impl MemoryRepoHost {
    /// Create an empty host. New commit ids are `<id_prefix><n>` starting at 1.
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            state: Arc::new(Mutex::new(HostState::default())),
            create_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The process-wide host registered under `name`, created empty on
    /// first use. Its commit ids are `<name>-<n>`.
    pub fn named(name: &str) -> Self {
        let registry = NAMED_HOSTS.get_or_init(Default::default);
        let mut hosts = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .entry(name.to_string())
            .or_insert_with(|| MemoryRepoHost::new(format!("{}-", name)))
            .clone()
    }

    /// Create an empty repository (no-op if it already exists).
    pub async fn create_repo(&self, repo: impl Into<RepoId>) {
        let mut state = self.state.lock().await;
        state.repos.entry(repo.into()).or_default();
    }

    /// Queue a one-shot failure for the next call of `op`.
    pub async fn fail_next(&self, op: RemoteOp, err: RemoteError) {
        let mut state = self.state.lock().await;
        state.faults.entry(op).or_default().push_back(err);
    }

    /// Delay every call of `op` by `delay` before it is served.
    pub async fn set_latency(&self, op: RemoteOp, delay: Duration) {
        let mut state = self.state.lock().await;
        state.latency.insert(op, delay);
    }

    /// Number of `create_commit` calls received, accepted or not.
    pub fn create_commit_calls(&self) -> u64 {
        self.create_calls.load(Ordering::Relaxed)
    }

    /// Current head of `branch`, if the branch exists.
    pub async fn branch_head(&self, repo: &RepoId, branch: &BranchName) -> Option<CommitId> {
        let state = self.state.lock().await;
        state.repos.get(repo)?.branches.get(branch).cloned()
    }

    /// Parents of a stored commit.
    pub async fn parents_of(&self, repo: &RepoId, commit: &CommitId) -> Option<Vec<CommitId>> {
        let state = self.state.lock().await;
        let c = state.repos.get(repo)?.commits.get(commit)?;
        Some(c.meta.parents.clone())
    }

    /// Full metadata of a stored commit.
    pub async fn metadata_of(&self, repo: &RepoId, commit: &CommitId) -> Option<CommitMetadata> {
        let state = self.state.lock().await;
        Some(state.repos.get(repo)?.commits.get(commit)?.meta.clone())
    }

    /// Content of `path` in the snapshot of `commit`.
    pub async fn read_file(&self, repo: &RepoId, commit: &CommitId, path: &str) -> Option<Bytes> {
        let state = self.state.lock().await;
        let r = state.repos.get(repo)?;
        let blob = r.commits.get(commit)?.tree.get(path)?;
        r.blobs.get(blob).cloned()
    }

    /// All paths present in the snapshot of `commit`.
    pub async fn paths_at(&self, repo: &RepoId, commit: &CommitId) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .repos
            .get(repo)
            .and_then(|r| r.commits.get(commit))
            .map(|c| c.tree.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Store a commit with an explicit diff listing, bypassing branch checks.
    ///
    /// Used to model source commits the normal write path cannot express,
    /// such as renames or commits recorded without an author.
    pub async fn import_commit(
        &self,
        repo: &RepoId,
        meta: CommitMetadata,
        diff: Vec<DiffEntry>,
        blobs: Vec<(BlobId, Bytes)>,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let r = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| repo_missing(repo))?;
        for (id, content) in blobs {
            r.blobs.insert(id, content);
        }
        let mut tree = meta
            .parents
            .first()
            .and_then(|p| r.commits.get(p))
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        for entry in &diff {
            if let Some(from) = &entry.renamed_from {
                tree.remove(from);
            }
            match &entry.after_blob {
                Some(blob) => {
                    tree.insert(entry.path.clone(), blob.clone());
                }
                None => {
                    tree.remove(&entry.path);
                }
            }
        }
        r.commits.insert(meta.id.clone(), StoredCommit { meta, tree, diff });
        Ok(())
    }

    /// Point `branch` at `commit` unconditionally.
    pub async fn set_branch(&self, repo: &RepoId, branch: &BranchName, commit: &CommitId) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let r = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| repo_missing(repo))?;
        r.branches.insert(branch.clone(), commit.clone());
        Ok(())
    }

    async fn enter(&self, op: RemoteOp) -> RemoteResult<()> {
        let delay = {
            let mut state = self.state.lock().await;
            if let Some(err) = state.faults.get_mut(&op).and_then(|q| q.pop_front()) {
                return Err(err);
            }
            state.latency.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

fn repo_missing(repo: &RepoId) -> RemoteError {
    RemoteError::NotFound {
        what: format!("repository {}", repo),
    }
}

fn validate_path(path: &str) -> RemoteResult<()> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(RemoteError::Rejected {
            msg: format!("invalid file path: {:?}", path),
        });
    }
    Ok(())
}

#[async_trait]
impl RepoClient for MemoryRepoHost {
    async fn get_commit(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<CommitMetadata> {
        self.enter(RemoteOp::GetCommit).await?;
        let state = self.state.lock().await;
        let r = state.repos.get(repo).ok_or_else(|| repo_missing(repo))?;
        r.commits
            .get(commit)
            .map(|c| c.meta.clone())
            .ok_or_else(|| RemoteError::CommitNotFound {
                commit_id: commit.to_string(),
            })
    }

    async fn list_changed_paths(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<Vec<DiffEntry>> {
        self.enter(RemoteOp::ListChangedPaths).await?;
        let state = self.state.lock().await;
        let r = state.repos.get(repo).ok_or_else(|| repo_missing(repo))?;
        r.commits
            .get(commit)
            .map(|c| c.diff.clone())
            .ok_or_else(|| RemoteError::CommitNotFound {
                commit_id: commit.to_string(),
            })
    }

    async fn get_blob(&self, repo: &RepoId, blob: &BlobId) -> RemoteResult<Bytes> {
        self.enter(RemoteOp::GetBlob).await?;
        let state = self.state.lock().await;
        let r = state.repos.get(repo).ok_or_else(|| repo_missing(repo))?;
        r.blobs.get(blob).cloned().ok_or_else(|| RemoteError::NotFound {
            what: format!("blob {}", blob),
        })
    }

    async fn get_branch_head(&self, repo: &RepoId, branch: &BranchName) -> RemoteResult<CommitId> {
        self.enter(RemoteOp::GetBranchHead).await?;
        let state = self.state.lock().await;
        let r = state.repos.get(repo).ok_or_else(|| repo_missing(repo))?;
        r.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| RemoteError::BranchNotFound {
                branch: branch.to_string(),
            })
    }

    async fn create_commit(&self, repo: &RepoId, spec: CommitSpec) -> RemoteResult<CommitId> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        self.enter(RemoteOp::CreateCommit).await?;

        if spec.put_files.is_empty() && spec.delete_files.is_empty() {
            return Err(RemoteError::Rejected {
                msg: "commit contains no changes".to_string(),
            });
        }
        for f in &spec.put_files {
            validate_path(&f.path)?;
        }
        for p in &spec.delete_files {
            validate_path(p)?;
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let r = state.repos.get_mut(repo).ok_or_else(|| repo_missing(repo))?;

        let head = r.branches.get(&spec.branch).cloned();
        match (&head, &spec.parent) {
            (Some(h), Some(p)) if h == p => {}
            (None, None) => {}
            (Some(h), Some(p)) => {
                return Err(RemoteError::Conflict {
                    msg: format!("parent {} is not the head of {} ({})", p, spec.branch, h),
                });
            }
            (Some(h), None) => {
                return Err(RemoteError::Conflict {
                    msg: format!("branch {} already exists at {}; parent required", spec.branch, h),
                });
            }
            (None, Some(p)) => {
                return Err(RemoteError::Conflict {
                    msg: format!("branch {} does not exist; parent {} is stale", spec.branch, p),
                });
            }
        }

        let mut tree = head
            .as_ref()
            .and_then(|h| r.commits.get(h))
            .map(|c| c.tree.clone())
            .unwrap_or_default();

        let mut diff = Vec::new();
        for path in &spec.delete_files {
            if tree.remove(path).is_none() {
                return Err(RemoteError::Rejected {
                    msg: format!("cannot delete missing file: {}", path),
                });
            }
            diff.push(DiffEntry::deleted(path.clone()));
        }
        for f in spec.put_files {
            state.next_blob += 1;
            let blob = BlobId::new(format!("blob-{}", state.next_blob));
            let unchanged = tree
                .get(&f.path)
                .and_then(|b| r.blobs.get(b))
                .map(|existing| existing == &f.content)
                .unwrap_or(false);
            r.blobs.insert(blob.clone(), f.content);
            if !unchanged {
                diff.push(DiffEntry::written(f.path.clone(), blob.clone()));
            }
            tree.insert(f.path, blob);
        }

        state.next_commit += 1;
        let id = CommitId::new(format!("{}{}", self.id_prefix, state.next_commit));
        let meta = CommitMetadata {
            id: id.clone(),
            message: spec.message,
            author_name: Some(spec.author_name),
            author_email: Some(spec.author_email),
            parents: head.into_iter().collect(),
        };
        r.commits.insert(id.clone(), StoredCommit { meta, tree, diff });
        r.branches.insert(spec.branch, id.clone());
        Ok(id)
    }
}
