//! Data model shared by the resolvers and the replicator.
//!
//! Every value here lives for a single replication attempt. Nothing is cached
//! across invocations; the two remote repositories are the only durable state.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Name of a hosted repository.
    RepoId
);
string_id!(
    /// Identifier of a commit within one repository.
    CommitId
);
string_id!(
    /// Name of a branch.
    BranchName
);
string_id!(
    /// Identifier of a blob (file content version).
    BlobId
);

/// A normalized request to replicate one source commit onto a destination branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    /// Repository the commit was made in.
    pub source_repo: RepoId,
    /// Repository the commit is replicated to.
    pub destination_repo: RepoId,
    /// The source commit.
    pub commit_id: CommitId,
    /// Branch name, used on both sides.
    pub branch_name: BranchName,
}

impl ReplicationRequest {
    /// Create a new request.
    pub fn new(
        source_repo: impl Into<RepoId>,
        destination_repo: impl Into<RepoId>,
        commit_id: impl Into<CommitId>,
        branch_name: impl Into<BranchName>,
    ) -> Self {
        Self {
            source_repo: source_repo.into(),
            destination_repo: destination_repo.into(),
            commit_id: commit_id.into(),
            branch_name: branch_name.into(),
        }
    }
}

/// Read-only snapshot of a source commit's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    /// Commit identifier.
    pub id: CommitId,
    /// Original commit message.
    pub message: String,
    /// Author name, if the source recorded one.
    pub author_name: Option<String>,
    /// Author email, if the source recorded one.
    pub author_email: Option<String>,
    /// Parent commits (empty for a root commit).
    pub parents: Vec<CommitId>,
}

/// One path-level difference reported by the source for a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    /// Path after the change, or the removed path for a deletion.
    pub path: String,
    /// Blob holding the post-change content; `None` for a deletion.
    pub after_blob: Option<BlobId>,
    /// Previous path when the entry is a rename.
    pub renamed_from: Option<String>,
}

impl DiffEntry {
    /// An added or modified file.
    pub fn written(path: impl Into<String>, blob: impl Into<BlobId>) -> Self {
        Self {
            path: path.into(),
            after_blob: Some(blob.into()),
            renamed_from: None,
        }
    }

    /// A deleted file.
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            after_blob: None,
            renamed_from: None,
        }
    }

    /// A file moved from `from` to `to`, with its content at the new path.
    pub fn renamed(from: impl Into<String>, to: impl Into<String>, blob: impl Into<BlobId>) -> Self {
        Self {
            path: to.into(),
            after_blob: Some(blob.into()),
            renamed_from: Some(from.into()),
        }
    }

    /// True if this entry removes the file without writing anything back.
    pub fn is_deletion(&self) -> bool {
        self.after_blob.is_none()
    }
}

/// Post-change state of one file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Opaque file content.
    pub content: Bytes,
}

impl FileChange {
    /// Create a new file change.
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Net effect of one commit: files to write, plus paths to delete when
/// deletions are propagated.
///
/// No two written files share a path, and no path is both written and
/// deleted. Order follows what the source reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    files: Vec<FileChange>,
    deleted: Vec<String>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a written file. A repeated path replaces the earlier content in place.
    pub fn push_file(&mut self, change: FileChange) {
        self.deleted.retain(|p| p != &change.path);
        match self.files.iter_mut().find(|f| f.path == change.path) {
            Some(existing) => existing.content = change.content,
            None => self.files.push(change),
        }
    }

    /// Record a deleted path. Ignored if the path is already written or deleted.
    pub fn push_deletion(&mut self, path: impl Into<String>) {
        let path = path.into();
        if self.files.iter().any(|f| f.path == path) || self.deleted.contains(&path) {
            return;
        }
        self.deleted.push(path);
    }

    /// Files to write, in source order.
    pub fn files(&self) -> &[FileChange] {
        &self.files
    }

    /// Paths to delete, in source order.
    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    /// Number of written files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if there is nothing to write and nothing to delete.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.deleted.is_empty()
    }

    /// Consume into (files, deleted paths).
    pub fn into_parts(self) -> (Vec<FileChange>, Vec<String>) {
        (self.files, self.deleted)
    }
}

/// State of the destination branch as observed before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageState {
    /// The branch exists; its head becomes the new commit's parent.
    HeadKnown(CommitId),
    /// The branch does not exist yet; the new commit becomes its root.
    BranchAbsent,
}

impl LineageState {
    /// Parent pointer to submit, if any.
    pub fn parent(&self) -> Option<&CommitId> {
        match self {
            LineageState::HeadKnown(id) => Some(id),
            LineageState::BranchAbsent => None,
        }
    }
}
