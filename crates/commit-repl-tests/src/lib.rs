//! Commit replication scenario tests
//!
//! End-to-end runs of the replicator against two in-memory regions: first
//! replication, chained replication, remote timeouts, concurrent submissions
//! and deletion handling.

pub mod harness;

#[cfg(test)]
mod scenarios;

pub use harness::{init_tracing, ReplicationHarness, DEST_REPO, SOURCE_REPO};
