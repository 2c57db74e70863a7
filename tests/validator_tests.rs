//! # Admission Validator Integration Tests
//!
//! Cross-record checks run against records persisted in the in-memory control plane:
//! - missing siblings never cause a rejection
//! - trustDomain, clusterName and issuer agreement
//! - immutability on update
//! - AdmissionReview handling

mod common;

use common::{agent, discovery_provider, server, Fault, FakeCluster, Op};
use kube::core::admission::AdmissionReview;
use spire_identity_operator::crd::{SpireAgent, SpireServer};
use spire_identity_operator::webhook::{review, Rejection, Validator};

#[tokio::test]
async fn test_accepts_when_no_sibling_exists() {
    let validator = Validator::new(FakeCluster::new());
    validator
        .validate_create(&server("example.org", "east", None))
        .await
        .expect("a lone record should be accepted");
}

#[tokio::test]
async fn test_rejects_trust_domain_mismatch_with_sibling() {
    let cluster = FakeCluster::new();
    cluster.seed(agent("example.org", "east"));
    let validator = Validator::new(cluster);

    let rejection = validator
        .validate_create(&server("other.org", "east", None))
        .await
        .expect_err("mismatched trust domain should be rejected");
    assert!(matches!(rejection, Rejection::SiblingMismatch { field: "trustDomain", .. }));
    let message = rejection.to_string();
    assert!(message.contains("trustDomain"));
    assert!(message.contains("SpireAgent"));
    assert!(message.contains("example.org"));
}

#[tokio::test]
async fn test_discovery_provider_rejected_against_persisted_server() {
    let cluster = FakeCluster::new();
    cluster.seed(server("other.org", "east", None));
    let validator = Validator::new(cluster);

    let rejection = validator
        .validate_create(&discovery_provider("example.org", None, true))
        .await
        .expect_err("trust domain disagreeing with the server should be rejected");
    let message = rejection.to_string();
    assert!(message.contains("trustDomain"));
    assert!(message.contains("other.org"));
}

#[tokio::test]
async fn test_lone_discovery_provider_is_accepted() {
    let validator = Validator::new(FakeCluster::new());
    validator
        .validate_create(&discovery_provider("example.org", None, true))
        .await
        .expect("no sibling means nothing to disagree with");
}

#[tokio::test]
async fn test_rejects_cluster_name_mismatch_between_server_and_agent() {
    let cluster = FakeCluster::new();
    cluster.seed(server("example.org", "east", None));
    let validator = Validator::new(cluster);

    let rejection = validator
        .validate_create(&agent("example.org", "west"))
        .await
        .expect_err("mismatched cluster name should be rejected");
    assert!(matches!(rejection, Rejection::SiblingMismatch { field: "clusterName", .. }));
}

#[tokio::test]
async fn test_issuer_comparison_ignores_scheme() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", Some("http://oidc.example.org"), true));
    let validator = Validator::new(cluster);

    validator
        .validate_create(&server("example.org", "east", Some("https://oidc.example.org")))
        .await
        .expect("issuers differing only by scheme should match");

    let rejection = validator
        .validate_create(&server("example.org", "east", Some("https://other.example.org")))
        .await
        .expect_err("different issuer host should be rejected");
    assert!(rejection.to_string().contains("jwtIssuer"));
}

#[tokio::test]
async fn test_unset_issuer_defaults_from_trust_domain() {
    let cluster = FakeCluster::new();
    cluster.seed(discovery_provider("example.org", None, true));
    let validator = Validator::new(cluster);

    validator
        .validate_create(&server("example.org", "east", Some("oidc-discovery.example.org")))
        .await
        .expect("explicit issuer equal to the default should match");
}

#[tokio::test]
async fn test_immutable_trust_domain_without_siblings() {
    let validator = Validator::new(FakeCluster::new());
    let old = server("example.org", "east", None);
    let new = server("other.org", "east", None);

    let rejection = validator
        .validate_update(&old, &new)
        .await
        .expect_err("trustDomain change should be rejected");
    assert!(matches!(rejection, Rejection::Immutable { field: "trustDomain", .. }));
    assert!(rejection.to_string().contains("trustDomain"));
}

#[tokio::test]
async fn test_trust_domain_mismatch_reported_before_cluster_name() {
    let cluster = FakeCluster::new();
    cluster.seed(server("other.org", "west", None));
    let validator = Validator::new(cluster);

    let rejection = validator
        .validate_create(&agent("example.org", "east"))
        .await
        .expect_err("both fields disagree with the server");
    assert!(matches!(rejection, Rejection::SiblingMismatch { field: "trustDomain", .. }));
    assert!(!rejection.to_string().contains("clusterName"));
}

#[tokio::test]
async fn test_immutability_checked_before_disagreeing_sibling() {
    let cluster = FakeCluster::new();
    cluster.seed(agent("third.org", "west"));
    let validator = Validator::new(cluster);
    let old = server("example.org", "east", None);
    let new = server("other.org", "east", None);

    let rejection = validator
        .validate_update(&old, &new)
        .await
        .expect_err("trustDomain change should be rejected");
    assert!(matches!(rejection, Rejection::Immutable { field: "trustDomain", .. }));
}

#[tokio::test]
async fn test_immutable_cluster_name() {
    let validator = Validator::new(FakeCluster::new());
    let rejection = validator
        .validate_update(&agent("example.org", "east"), &agent("example.org", "west"))
        .await
        .expect_err("clusterName change should be rejected");
    assert!(matches!(rejection, Rejection::Immutable { field: "clusterName", .. }));
}

#[tokio::test]
async fn test_rejects_non_singleton_name() {
    let validator = Validator::new(FakeCluster::new());
    let mut record = server("example.org", "east", None);
    record.metadata.name = Some("secondary".to_string());

    let rejection = validator
        .validate_create(&record)
        .await
        .expect_err("only the singleton name is allowed");
    assert!(matches!(rejection, Rejection::InvalidName { .. }));
}

#[tokio::test]
async fn test_lookup_failure_denies() {
    let cluster = FakeCluster::new();
    cluster.inject::<SpireAgent>(Op::Get, Fault::Transport("apiserver unavailable".to_string()), 1);
    let validator = Validator::new(cluster);

    let rejection = validator
        .validate_create(&server("example.org", "east", None))
        .await
        .expect_err("lookup failure should deny");
    assert!(matches!(rejection, Rejection::Lookup(_)));
}

fn admission_review(operation: &str, object: &SpireServer, old: Option<&SpireServer>) -> AdmissionReview<SpireServer> {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": { "group": "spire.identity.io", "version": "v1alpha1", "kind": "SpireServer" },
            "resource": { "group": "spire.identity.io", "version": "v1alpha1", "resource": "spireservers" },
            "name": "cluster",
            "operation": operation,
            "userInfo": { "username": "admin" },
            "object": object,
            "oldObject": old,
            "dryRun": false
        }
    }))
    .expect("admission review should deserialize")
}

#[tokio::test]
async fn test_review_denies_with_message() {
    let cluster = FakeCluster::new();
    cluster.seed(agent("example.org", "east"));
    let validator = Validator::new(cluster);

    let body = admission_review("CREATE", &server("other.org", "east", None), None);
    let response = review(&validator, body).await.response.expect("review should carry a response");
    assert!(!response.allowed);

    let rendered = serde_json::to_string(&response).expect("response should serialize");
    assert!(rendered.contains("does not match"));
}

#[tokio::test]
async fn test_review_allows_valid_update_and_delete() {
    let validator = Validator::new(FakeCluster::new());
    let record = server("example.org", "east", None);

    let update = admission_review("UPDATE", &record, Some(&record));
    let response = review(&validator, update).await.response.expect("review should carry a response");
    assert!(response.allowed);

    let delete = admission_review("DELETE", &record, Some(&record));
    let response = review(&validator, delete).await.response.expect("review should carry a response");
    assert!(response.allowed);
}
