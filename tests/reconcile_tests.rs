//! # Reconciler Pass Integration Tests
//!
//! Full passes against the in-memory control plane:
//! - first pass creates every owned object, second pass writes nothing
//! - drift correction and create-only mode
//! - failing steps and invalid specs surface in status
//! - singleton recreation, owner links and the aggregate operand condition

mod common;

use common::{agent, context, discovery_provider, scaffolding, server, Fault, FakeCluster, Op, NAMESPACE};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::Resource;
use spire_identity_operator::constants::CREATE_ONLY_ANNOTATION;
use spire_identity_operator::controller::manifests::{agent as agent_manifests, discovery, server as server_manifests};
use spire_identity_operator::controller::reconciler::{
    run_pass, AgentReconciler, DiscoveryProviderReconciler, PassOutcome, ScaffoldingReconciler,
    ServerReconciler,
};
use spire_identity_operator::crd::{
    IdentityRecord, RecordStatus, Route, SpireAgent, SpireOidcDiscoveryProvider, SpireServer,
    ZeroTrustWorkloadIdentityManager,
};
use spire_identity_operator::error::ReconcileError;
use std::collections::BTreeMap;

fn status_of<K: IdentityRecord>(cluster: &FakeCluster) -> RecordStatus {
    cluster
        .fetch::<K>(None, "cluster")
        .and_then(|r| r.status().cloned())
        .expect("record should have a status")
}

fn owned_by<K: Resource>(obj: &K, uid: &str) -> bool {
    obj.meta()
        .owner_references
        .iter()
        .flatten()
        .any(|o| o.uid == uid && o.controller == Some(true))
}

#[tokio::test]
async fn test_discovery_pass_creates_owned_objects_then_writes_nothing() {
    let cluster = FakeCluster::new();
    let record = cluster.seed(discovery_provider("example.org", None, true));
    let uid = record.metadata.uid.clone().expect("seeded record has a uid");
    let ctx = context(cluster.clone());

    let outcome = run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Converged);

    let deployment = cluster
        .fetch::<Deployment>(Some(NAMESPACE), discovery::NAME)
        .expect("deployment should be created");
    assert!(owned_by(&deployment, &uid));
    let config_map = cluster
        .fetch::<ConfigMap>(Some(NAMESPACE), discovery::NAME)
        .expect("config map should be created");
    assert!(owned_by(&config_map, &uid));
    let service = cluster
        .fetch::<Service>(Some(NAMESPACE), discovery::NAME)
        .expect("service should be created");
    assert!(owned_by(&service, &uid));
    assert!(cluster.fetch::<ServiceAccount>(Some(NAMESPACE), discovery::NAME).is_some());
    let route = cluster
        .fetch::<Route>(Some(NAMESPACE), discovery::ROUTE_NAME)
        .expect("route should be created");
    assert_eq!(route.spec.host.as_deref(), Some("oidc-discovery.example.org"));

    let status = status_of::<SpireOidcDiscoveryProvider>(&cluster);
    for condition in [
        "ConfigurationValid",
        "ServiceAccountAvailable",
        "ServiceAvailable",
        "ConfigMapAvailable",
        "DeploymentAvailable",
        "RouteAvailable",
        "Ready",
    ] {
        assert!(status.is_true(condition), "{condition} should be True");
    }
    assert_eq!(status.observed_generation, Some(1));

    cluster.clear_writes();
    let outcome = run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Converged);
    assert_eq!(cluster.write_count(), 0, "unexpected writes: {:?}", cluster.writes());
}

#[tokio::test]
async fn test_disabled_route_is_reported_once() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", None, false));
    let ctx = context(cluster.clone());

    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert!(cluster.fetch::<Route>(Some(NAMESPACE), discovery::ROUTE_NAME).is_none());

    let status = status_of::<SpireOidcDiscoveryProvider>(&cluster);
    let route = status.condition("RouteAvailable").expect("route condition should exist");
    assert_eq!(route.status, "False");
    assert_eq!(route.reason.as_deref(), Some("ManagedRouteDisabled"));
    assert!(status.is_true("Ready"));

    cluster.clear_writes();
    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert_eq!(cluster.write_count(), 0);
}

#[tokio::test]
async fn test_drifted_workload_is_restored() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", None, true));
    let ctx = context(cluster.clone());
    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");

    cluster.mutate::<Deployment>(Some(NAMESPACE), discovery::NAME, |d| {
        if let Some(spec) = d.spec.as_mut() {
            spec.replicas = Some(5);
        }
    });

    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");
    let deployment = cluster
        .fetch::<Deployment>(Some(NAMESPACE), discovery::NAME)
        .expect("deployment should exist");
    assert_eq!(deployment.spec.and_then(|s| s.replicas), Some(1));
}

#[tokio::test]
async fn test_config_change_rolls_workload_through_hash() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", None, true));
    let ctx = context(cluster.clone());
    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");

    let hash_of = |cluster: &FakeCluster| {
        cluster
            .fetch::<Deployment>(Some(NAMESPACE), discovery::NAME)
            .and_then(|d| d.spec)
            .and_then(|s| s.template.metadata)
            .and_then(|m| m.annotations)
            .and_then(|a| a.get("spire.identity.io/config-hash").cloned())
            .expect("pod template should carry the config hash")
    };
    let before = hash_of(&cluster);

    cluster.mutate::<SpireOidcDiscoveryProvider>(None, "cluster", |r| {
        r.spec.log_level = "debug".to_string();
    });
    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");

    assert_ne!(before, hash_of(&cluster));
}

#[tokio::test]
async fn test_create_only_annotation_leaves_existing_objects() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", None, true));
    let ctx = context(cluster.clone());
    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");

    cluster.mutate::<Deployment>(Some(NAMESPACE), discovery::NAME, |d| {
        if let Some(spec) = d.spec.as_mut() {
            spec.replicas = Some(3);
        }
    });
    cluster.mutate::<SpireOidcDiscoveryProvider>(None, "cluster", |r| {
        r.metadata.annotations = Some(BTreeMap::from([(
            CREATE_ONLY_ANNOTATION.to_string(),
            "True".to_string(),
        )]));
    });

    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("pass should succeed");
    let deployment = cluster
        .fetch::<Deployment>(Some(NAMESPACE), discovery::NAME)
        .expect("deployment should exist");
    assert_eq!(deployment.spec.and_then(|s| s.replicas), Some(3));
}

#[tokio::test]
async fn test_failing_step_aborts_pass_and_marks_not_ready() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", None, true));
    cluster.inject::<Service>(Op::Create, Fault::Transport("connection refused".to_string()), 1);
    let ctx = context(cluster.clone());

    let err = run_pass(&DiscoveryProviderReconciler, &ctx, "cluster")
        .await
        .expect_err("pass should fail");
    assert!(matches!(err, ReconcileError::Step { step: "ServiceAvailable", .. }));
    assert!(err.is_retryable());

    assert!(cluster.fetch::<ServiceAccount>(Some(NAMESPACE), discovery::NAME).is_some());
    assert!(cluster.fetch::<ConfigMap>(Some(NAMESPACE), discovery::NAME).is_none());

    let status = status_of::<SpireOidcDiscoveryProvider>(&cluster);
    assert!(status.is_true("ServiceAccountAvailable"));
    let service = status.condition("ServiceAvailable").expect("service condition should exist");
    assert_eq!(service.status, "False");
    assert_eq!(service.reason.as_deref(), Some("CreateFailed"));
    let ready = status.condition("Ready").expect("ready condition should exist");
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some("StepFailed"));

    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("retry should succeed");
    assert!(status_of::<SpireOidcDiscoveryProvider>(&cluster).is_true("Ready"));
}

#[tokio::test]
async fn test_invalid_spec_creates_nothing() {
    let cluster = FakeCluster::new();
    cluster.seed(server("Not A Domain", "east", None));
    let ctx = context(cluster.clone());

    let err = run_pass(&ServerReconciler, &ctx, "cluster").await.expect_err("pass should fail");
    assert!(matches!(err, ReconcileError::InvalidSpec { .. }));
    assert!(!err.is_retryable());
    assert!(cluster.fetch::<StatefulSet>(Some(NAMESPACE), server_manifests::NAME).is_none());

    let status = status_of::<SpireServer>(&cluster);
    let valid = status.condition("ConfigurationValid").expect("condition should exist");
    assert_eq!(valid.status, "False");
    let ready = status.condition("Ready").expect("ready condition should exist");
    assert_eq!(ready.reason.as_deref(), Some("InvalidConfiguration"));
}

#[tokio::test]
async fn test_missing_operand_record_is_idle() {
    let cluster = FakeCluster::new();
    let ctx = context(cluster.clone());

    let outcome = run_pass(&ServerReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Idle);
    assert_eq!(cluster.write_count(), 0);
}

#[tokio::test]
async fn test_missing_scaffolding_singleton_is_recreated() {
    let cluster = FakeCluster::new();
    let ctx = context(cluster.clone());

    let outcome = run_pass(&ScaffoldingReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Recreated);
    assert!(cluster.fetch::<ZeroTrustWorkloadIdentityManager>(None, "cluster").is_some());

    let outcome = run_pass(&ScaffoldingReconciler, &ctx, "cluster").await.expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Converged);
    for name in [server_manifests::NAME, agent_manifests::NAME] {
        assert!(cluster.fetch::<ClusterRole>(None, name).is_some());
        let binding = cluster
            .fetch::<ClusterRoleBinding>(None, name)
            .expect("binding should be created");
        let subject = binding.subjects.and_then(|s| s.into_iter().next()).expect("binding has a subject");
        assert_eq!(subject.namespace.as_deref(), Some(NAMESPACE));
    }

    let status = status_of::<ZeroTrustWorkloadIdentityManager>(&cluster);
    let operands = status.condition("OperandsAvailable").expect("condition should exist");
    assert_eq!(operands.status, "False");
    assert!(operands
        .message
        .as_deref()
        .is_some_and(|m| m.contains("SpireServer not found")));
}

#[tokio::test]
async fn test_only_the_singleton_name_is_recreated() {
    let cluster = FakeCluster::new();
    let ctx = context(cluster.clone());

    let outcome = run_pass(&ScaffoldingReconciler, &ctx, "other").await.expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Idle);
    assert_eq!(cluster.write_count(), 0);
}

#[tokio::test]
async fn test_operands_are_linked_to_scaffolding_and_aggregated() {
    let cluster = FakeCluster::new();
    let singleton = cluster.seed(scaffolding());
    let singleton_uid = singleton.metadata.uid.clone().expect("seeded record has a uid");
    cluster.seed(server("example.org", "east", None));
    cluster.seed(agent("example.org", "east"));
    cluster.seed(discovery_provider("example.org", None, true));
    let ctx = context(cluster.clone());

    run_pass(&ServerReconciler, &ctx, "cluster").await.expect("server pass should succeed");
    run_pass(&AgentReconciler, &ctx, "cluster").await.expect("agent pass should succeed");
    run_pass(&DiscoveryProviderReconciler, &ctx, "cluster").await.expect("provider pass should succeed");

    let server_record = cluster.fetch::<SpireServer>(None, "cluster").expect("server should exist");
    assert!(server_record
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|o| o.uid == singleton_uid && o.controller != Some(true)));
    assert!(cluster.fetch::<StatefulSet>(Some(NAMESPACE), server_manifests::NAME).is_some());
    assert!(cluster.fetch::<DaemonSet>(Some(NAMESPACE), agent_manifests::NAME).is_some());
    assert!(status_of::<SpireAgent>(&cluster).is_true("Ready"));

    cluster.clear_writes();
    run_pass(&ServerReconciler, &ctx, "cluster").await.expect("server pass should succeed");
    assert_eq!(cluster.write_count(), 0, "unexpected writes: {:?}", cluster.writes());

    run_pass(&ScaffoldingReconciler, &ctx, "cluster").await.expect("scaffolding pass should succeed");
    let status = status_of::<ZeroTrustWorkloadIdentityManager>(&cluster);
    assert!(status.is_true("OperandsAvailable"));
    assert!(status.is_true("Ready"));
}
