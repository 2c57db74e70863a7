//! # Status Manager Integration Tests
//!
//! Flushing buffered conditions through the in-memory control plane:
//! - one condition per type, last write wins
//! - no write when nothing changed
//! - conflict retries and their bound
//! - records deleted before the flush

mod common;

use common::{server, Fault, FakeCluster, Op};
use spire_identity_operator::controller::status::StatusManager;
use spire_identity_operator::crd::{SpireServer, CONDITION_FALSE, CONDITION_TRUE};
use spire_identity_operator::error::ClusterError;

fn stored(cluster: &FakeCluster) -> SpireServer {
    cluster.fetch::<SpireServer>(None, "cluster").expect("record should exist")
}

#[tokio::test]
async fn test_flush_writes_one_condition_per_type() {
    let cluster = FakeCluster::new();
    let record = cluster.seed(server("example.org", "east", None));

    let mut status = StatusManager::new(record.metadata.generation, 3);
    status.add_condition("ConfigMapAvailable", "Converged", "created", true);
    status.add_condition("ConfigMapAvailable", "UpdateFailed", "update rejected", false);
    status.add_condition("Ready", "StepFailed", "ConfigMapAvailable failed", false);

    assert!(status.flush(&cluster, &record).await.expect("flush should succeed"));

    let persisted = stored(&cluster).status.expect("status should be set");
    assert_eq!(persisted.conditions.len(), 2);
    let config_map = persisted.condition("ConfigMapAvailable").expect("condition should exist");
    assert_eq!(config_map.status, CONDITION_FALSE);
    assert_eq!(config_map.reason.as_deref(), Some("UpdateFailed"));
    assert_eq!(persisted.observed_generation, Some(1));
    assert_eq!(cluster.write_count(), 1);
}

#[tokio::test]
async fn test_flush_skips_write_when_status_matches() {
    let cluster = FakeCluster::new();
    let record = cluster.seed(server("example.org", "east", None));

    let mut status = StatusManager::new(record.metadata.generation, 3);
    status.add_condition("Ready", "Ready", "all SpireServer components are available", true);
    assert!(status.flush(&cluster, &record).await.expect("first flush should succeed"));

    let refreshed = stored(&cluster);
    let before = refreshed.status.clone();
    assert!(!status.flush(&cluster, &refreshed).await.expect("second flush should succeed"));
    assert_eq!(cluster.write_count(), 1);
    assert_eq!(stored(&cluster).status, before);
}

#[tokio::test]
async fn test_flush_retries_after_conflict() {
    let cluster = FakeCluster::new();
    let record = cluster.seed(server("example.org", "east", None));
    cluster.inject::<SpireServer>(Op::ReplaceStatus, Fault::Conflict, 2);

    let mut status = StatusManager::new(record.metadata.generation, 3);
    status.add_condition("Ready", "Ready", "ok", true);
    assert!(status.flush(&cluster, &record).await.expect("flush should succeed after retries"));

    let persisted = stored(&cluster).status.expect("status should be set");
    assert_eq!(
        persisted.condition("Ready").map(|c| c.status.as_str()),
        Some(CONDITION_TRUE)
    );
}

#[tokio::test]
async fn test_flush_retries_from_fresh_copy_after_concurrent_write() {
    let cluster = FakeCluster::new();
    let stale = cluster.seed(server("example.org", "east", None));

    let mut other = StatusManager::new(stale.metadata.generation, 0);
    other.add_condition("ServiceAvailable", "Converged", "written elsewhere", true);
    other.flush(&cluster, &stale).await.expect("concurrent flush should succeed");

    let mut status = StatusManager::new(stale.metadata.generation, 1);
    status.add_condition("Ready", "Ready", "ok", true);
    assert!(status.flush(&cluster, &stale).await.expect("stale flush should retry"));

    let persisted = stored(&cluster).status.expect("status should be set");
    assert!(persisted.is_true("ServiceAvailable"));
    assert!(persisted.is_true("Ready"));
}

#[tokio::test]
async fn test_flush_gives_up_after_bounded_retries() {
    let cluster = FakeCluster::new();
    let record = cluster.seed(server("example.org", "east", None));
    cluster.inject::<SpireServer>(Op::ReplaceStatus, Fault::Conflict, 10);

    let mut status = StatusManager::new(record.metadata.generation, 2);
    status.add_condition("Ready", "Ready", "ok", true);
    let err = status
        .flush(&cluster, &record)
        .await
        .expect_err("flush should give up");
    assert!(matches!(err, ClusterError::Conflict { .. }));
}

#[tokio::test]
async fn test_flush_on_deleted_record_is_not_an_error() {
    let cluster = FakeCluster::new();
    let record = cluster.seed(server("example.org", "east", None));
    cluster.remove::<SpireServer>(None, "cluster");

    let mut status = StatusManager::new(record.metadata.generation, 3);
    status.add_condition("Ready", "Ready", "ok", true);
    assert!(!status.flush(&cluster, &record).await.expect("flush should succeed"));
    assert_eq!(cluster.write_count(), 0);
}
