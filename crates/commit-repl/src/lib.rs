#![warn(missing_docs)]

//! Cross-region commit replication: resolve what a source commit changed,
//! find where it belongs on the destination branch, and submit it there as
//! one atomic commit.

pub mod changeset;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod lineage;
pub mod memory;
pub mod outcome;
pub mod replicator;
pub mod timeout;
pub mod types;

pub use changeset::{ChangeSetResolver, DeletionPolicy, ResolvedCommit};
pub use client::{CommitSpec, RemoteOp, RemoteResult, RepoClient};
pub use config::{Endpoint, PartialConfig, ReplConfig};
pub use error::{ConfigError, ErrorKind, RemoteError};
pub use lineage::resolve_lineage;
pub use memory::MemoryRepoHost;
pub use outcome::{InvocationResponse, ReplicationFailure, ReplicationResult, Stage};
pub use replicator::{replicate, CommitReplicator, EngineConfig};
pub use timeout::TimeoutClient;
pub use types::{
    BlobId, BranchName, ChangeSet, CommitId, CommitMetadata, DiffEntry, FileChange, LineageState,
    ReplicationRequest, RepoId,
};
