//! Replication scenarios against two in-memory regions.

use bytes::Bytes;
use std::time::Duration;

use commit_repl::event::decode_event;
use commit_repl::{
    CommitId, DeletionPolicy, EngineConfig, ErrorKind, PartialConfig, RemoteError, RemoteOp,
    ReplicationResult, Stage,
};

use crate::harness::{init_tracing, ReplicationHarness};

fn new_commit(result: &ReplicationResult) -> CommitId {
    match result {
        ReplicationResult::Success { new_commit_id, .. } => new_commit_id.clone(),
        ReplicationResult::Failure(f) => panic!("expected success, got {}", f),
    }
}

mod first_and_chained {
    use super::*;

    #[tokio::test]
    async fn test_first_replication_to_empty_branch() {
        init_tracing();
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();

        let result = h.replicate(&c1).await;
        let d1 = new_commit(&result);
        assert_eq!(d1.as_str(), "d1");

        assert_eq!(h.dest_parents(&d1).await, Some(vec![]));
        assert_eq!(h.dest_file(&d1, "a.txt").await, Some(Bytes::from("hello")));
        assert_eq!(h.dest_head().await, Some(d1.clone()));

        let meta = h.dest.metadata_of(&h.dest_repo, &d1).await.unwrap();
        assert_eq!(meta.message, "[Replicated] add a");
        assert_eq!(meta.author_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(meta.author_email.as_deref(), Some("ada@example.com"));

        let resp = result.to_response();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body["sourceCommit"], "c1");
        assert_eq!(resp.body["destinationCommit"], "d1");
    }

    #[tokio::test]
    async fn test_second_replication_follows_destination_head() {
        init_tracing();
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();
        let c2 = h.commit_source("edit a", &[("a.txt", "world")]).await.unwrap();

        let d1 = new_commit(&h.replicate(&c1).await);
        let d2 = new_commit(&h.replicate(&c2).await);

        assert_eq!(h.dest_parents(&d2).await, Some(vec![d1]));
        assert_eq!(h.dest_file(&d2, "a.txt").await, Some(Bytes::from("world")));
        assert_eq!(h.dest_head().await, Some(d2));
    }

    #[tokio::test]
    async fn test_concurrent_resolve_gives_same_history() {
        let h = ReplicationHarness::new().await.with_config(EngineConfig {
            concurrent_resolve: true,
            ..Default::default()
        });
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();
        let c2 = h.commit_source("add b", &[("b.txt", "x")]).await.unwrap();

        let d1 = new_commit(&h.replicate(&c1).await);
        let d2 = new_commit(&h.replicate(&c2).await);
        assert_eq!(h.dest_parents(&d2).await, Some(vec![d1]));
        assert_eq!(h.dest_paths(&d2).await, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_unreplicated_commits_stay_behind() {
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add a", &[("a.txt", "1")]).await.unwrap();
        h.commit_source("add b", &[("b.txt", "2")]).await.unwrap();

        // Replicating only the first commit leaves the second behind.
        let d1 = new_commit(&h.replicate(&c1).await);
        assert_eq!(h.dest_paths(&d1).await, vec!["a.txt".to_string()]);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_missing_source_commit_writes_nothing() {
        init_tracing();
        let h = ReplicationHarness::new().await;

        let result = h.replicate(&"does-not-exist".into()).await;
        let f = result.failure().unwrap();
        assert_eq!(f.stage, Stage::FetchMetadata);
        assert_eq!(f.kind, ErrorKind::CommitNotFound);
        assert_eq!(h.dest.create_commit_calls(), 0);
        assert!(h.dest_head().await.is_none());

        let resp = result.to_response();
        assert_eq!(resp.status_code, 500);
        assert_eq!(resp.body["error"], "CommitNotFound");
    }

    #[tokio::test(start_paused = true)]
    async fn test_branch_head_timeout_is_remote_unavailable() {
        init_tracing();
        let h = ReplicationHarness::new()
            .await
            .with_timeout(Duration::from_millis(100));
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();
        h.dest
            .set_latency(RemoteOp::GetBranchHead, Duration::from_secs(5))
            .await;

        let result = h.replicate(&c1).await;
        let f = result.failure().unwrap();
        assert_eq!(f.stage, Stage::ResolveLineage);
        assert_eq!(f.kind, ErrorKind::RemoteUnavailable);
        assert!(f.message.contains("timed out"));
        assert_eq!(h.dest.create_commit_calls(), 0);
    }

    #[tokio::test]
    async fn test_injected_lineage_fault_submits_nothing() {
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();
        h.dest
            .fail_next(RemoteOp::GetBranchHead, RemoteError::unavailable("connection reset"))
            .await;

        let result = h.replicate(&c1).await;
        assert_eq!(result.failure().unwrap().kind, ErrorKind::RemoteUnavailable);
        assert_eq!(h.dest.create_commit_calls(), 0);

        // Nothing was cached from the failed attempt; a fresh one succeeds.
        let d1 = new_commit(&h.replicate(&c1).await);
        assert_eq!(h.dest_head().await, Some(d1));
    }

    #[tokio::test]
    async fn test_blob_fault_fails_in_resolve_changes() {
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();
        h.source
            .fail_next(RemoteOp::GetBlob, RemoteError::unknown("blob store hiccup"))
            .await;

        let f = h.replicate(&c1).await.failure().cloned().unwrap();
        assert_eq!(f.stage, Stage::ResolveChanges);
        assert_eq!(f.kind, ErrorKind::Unknown);
        assert_eq!(f.message, "blob store hiccup");
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_racing_replications_one_conflicts() {
        init_tracing();
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("base", &[("a.txt", "one")]).await.unwrap();
        let c2 = h.commit_source("edit a", &[("a.txt", "two")]).await.unwrap();
        let c3 = h.commit_source("add b", &[("b.txt", "three")]).await.unwrap();
        let d1 = new_commit(&h.replicate(&c1).await);

        // Both attempts read head d1 before either submission lands.
        h.dest
            .set_latency(RemoteOp::CreateCommit, Duration::from_millis(50))
            .await;
        let replicator = h.replicator();
        let req2 = h.request(&c2);
        let req3 = h.request(&c3);
        let (r2, r3) = tokio::join!(replicator.replicate(&req2), replicator.replicate(&req3));

        let (winner, loser) = match (&r2, &r3) {
            (ReplicationResult::Success { .. }, ReplicationResult::Failure(_)) => (&r2, &r3),
            (ReplicationResult::Failure(_), ReplicationResult::Success { .. }) => (&r3, &r2),
            other => panic!("expected exactly one success, got {:?}", other),
        };

        let f = loser.failure().unwrap();
        assert_eq!(f.stage, Stage::SubmitCommit);
        assert_eq!(f.kind, ErrorKind::Conflict);

        let d2 = new_commit(winner);
        assert_eq!(d2.as_str(), "d2");
        assert_eq!(h.dest_parents(&d2).await, Some(vec![d1]));
        assert_eq!(h.dest_head().await, Some(d2));
        assert_eq!(h.dest.create_commit_calls(), 3);
    }
}

mod deletions {
    use super::*;

    #[tokio::test]
    async fn test_propagated_deletion_removes_file() {
        let h = ReplicationHarness::new().await.with_config(EngineConfig {
            deletion_policy: DeletionPolicy::Propagate,
            ..Default::default()
        });
        let c1 = h.commit_source("add", &[("a.txt", "1"), ("b.txt", "2")]).await.unwrap();
        let c2 = h.delete_source("rm b", &["b.txt"]).await.unwrap();

        new_commit(&h.replicate(&c1).await);
        let d2 = new_commit(&h.replicate(&c2).await);
        assert_eq!(h.dest_paths(&d2).await, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_omitted_deletion_keeps_file() {
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add", &[("a.txt", "1"), ("b.txt", "2")]).await.unwrap();
        h.delete_source("rm b", &["b.txt"]).await.unwrap();
        let c3 = h.commit_source("edit a", &[("a.txt", "3")]).await.unwrap();

        new_commit(&h.replicate(&c1).await);
        let d2 = new_commit(&h.replicate(&c3).await);
        assert_eq!(h.dest_paths(&d2).await, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(h.dest_file(&d2, "a.txt").await, Some(Bytes::from("3")));
    }

    #[tokio::test]
    async fn test_delete_only_commit_under_omit_is_rejected() {
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add", &[("a.txt", "1"), ("b.txt", "2")]).await.unwrap();
        let c2 = h.delete_source("rm b", &["b.txt"]).await.unwrap();

        let d1 = new_commit(&h.replicate(&c1).await);
        let f = h.replicate(&c2).await.failure().cloned().unwrap();
        assert_eq!(f.stage, Stage::SubmitCommit);
        assert_eq!(f.kind, ErrorKind::Rejected);
        assert_eq!(h.dest_head().await, Some(d1));
    }
}

mod events {
    use super::*;

    #[tokio::test]
    async fn test_notification_drives_replication() {
        let h = ReplicationHarness::new().await;
        let c1 = h.commit_source("add a", &[("a.txt", "hello")]).await.unwrap();
        let config = PartialConfig {
            source_repo: Some(h.source_repo.to_string()),
            destination_repo: Some(h.dest_repo.to_string()),
            source_endpoint: Some("memory://east".into()),
            destination_endpoint: Some("memory://west".into()),
            ..Default::default()
        }
        .build()
        .unwrap();

        let payload = format!(
            r#"{{"detail": {{"commitId": "{}", "referenceName": "refs/heads/main", "repositoryName": "src"}}}}"#,
            c1
        );
        let request = decode_event(&payload, &config).unwrap();
        assert_eq!(request, h.request(&c1));

        let d1 = new_commit(&h.replicator().replicate(&request).await);
        assert_eq!(h.dest_file(&d1, "a.txt").await, Some(Bytes::from("hello")));
    }
}
