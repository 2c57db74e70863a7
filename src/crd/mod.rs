//! # Custom Resource Definitions
//!
//! CRD types for the SPIRE Identity Operator.
//!
//! Every record kind is a cluster-scoped singleton conventionally named `cluster`:
//!
//! - [`SpireServer`] - the SPIRE server deployment
//! - [`SpireAgent`] - the SPIRE agent DaemonSet
//! - [`SpireOidcDiscoveryProvider`] - the OIDC discovery provider and its route
//! - [`ZeroTrustWorkloadIdentityManager`] - cluster-wide scaffolding owning the operands

mod record;
mod route;
mod status;

pub use record::{IdentityRecord, RecordKind};
pub use route::{Route, RoutePort, RouteSpec, RouteStatus, RouteTargetReference, RouteTls};
pub use status::{Condition, RecordStatus, CONDITION_FALSE, CONDITION_TRUE};

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SpireServer Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: spire.identity.io/v1alpha1
/// kind: SpireServer
/// metadata:
///   name: cluster
/// spec:
///   trustDomain: example.org
///   clusterName: prod-east
///   jwtIssuer: https://oidc-discovery.example.org
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SpireServer",
    group = "spire.identity.io",
    version = "v1alpha1",
    status = "RecordStatus",
    printcolumn = r#"{"name":"Trust Domain", "type":"string", "jsonPath":".spec.trustDomain"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpireServerSpec {
    /// SPIFFE trust domain. Immutable after creation.
    pub trust_domain: String,
    /// Name of this cluster as registered with the server. Immutable after creation.
    pub cluster_name: String,
    /// Issuer placed in JWT-SVIDs. Defaults to `oidc-discovery.<trustDomain>`.
    #[serde(default)]
    pub jwt_issuer: Option<String>,
    /// Number of server replicas
    #[serde(default = "default_replica_count")]
    pub replicas: i32,
    /// Server log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// CA certificate lifetime (e.g. "24h")
    #[serde(default = "default_ca_ttl")]
    pub ca_ttl: String,
    /// Default X509-SVID lifetime
    #[serde(default = "default_x509_svid_ttl")]
    pub default_x509_svid_ttl: String,
    /// Default JWT-SVID lifetime
    #[serde(default = "default_jwt_svid_ttl")]
    pub default_jwt_svid_ttl: String,
    #[serde(flatten)]
    pub common: CommonConfig,
}

/// SpireAgent Custom Resource Definition
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SpireAgent",
    group = "spire.identity.io",
    version = "v1alpha1",
    status = "RecordStatus",
    printcolumn = r#"{"name":"Trust Domain", "type":"string", "jsonPath":".spec.trustDomain"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpireAgentSpec {
    /// SPIFFE trust domain. Immutable after creation.
    pub trust_domain: String,
    /// Name of this cluster as registered with the server. Immutable after creation.
    pub cluster_name: String,
    /// Agent log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Skip kubelet certificate verification in the workload attestor
    #[serde(default = "default_true")]
    pub skip_kubelet_verification: bool,
    #[serde(flatten)]
    pub common: CommonConfig,
}

/// SpireOidcDiscoveryProvider Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: spire.identity.io/v1alpha1
/// kind: SpireOidcDiscoveryProvider
/// metadata:
///   name: cluster
/// spec:
///   trustDomain: example.org
///   replicaCount: 2
///   managedRoute: true
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SpireOidcDiscoveryProvider",
    group = "spire.identity.io",
    version = "v1alpha1",
    status = "RecordStatus",
    shortname = "oidcdp",
    printcolumn = r#"{"name":"Trust Domain", "type":"string", "jsonPath":".spec.trustDomain"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpireOidcDiscoveryProviderSpec {
    /// SPIFFE trust domain
    pub trust_domain: String,
    /// Issuer served in the discovery document. Defaults to `oidc-discovery.<trustDomain>`.
    #[serde(default)]
    pub jwt_issuer: Option<String>,
    /// Number of provider replicas
    #[serde(default = "default_replica_count")]
    pub replica_count: i32,
    /// Expose the provider through an externally reachable Route
    #[serde(default = "default_true")]
    pub managed_route: bool,
    /// Name of the agent Workload API socket the provider connects to
    #[serde(default = "default_agent_socket_name")]
    pub agent_socket_name: String,
    /// Provider log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(flatten)]
    pub common: CommonConfig,
}

/// ZeroTrustWorkloadIdentityManager Custom Resource Definition
///
/// Singleton owning the cluster-wide scaffolding. Recreated by the operator when removed.
#[derive(
    CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "ZeroTrustWorkloadIdentityManager",
    group = "spire.identity.io",
    version = "v1alpha1",
    status = "RecordStatus",
    shortname = "ztwim",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZeroTrustWorkloadIdentityManagerSpec {
    /// Labels added to every scaffolding object (standard keys always win)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Settings shared by every operand record
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonConfig {
    /// Labels added to every managed object (standard keys always win)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Node selector for operand pods
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    /// Tolerations for operand pods
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_list")]
    pub tolerations: Vec<Toleration>,
    /// Affinity for operand pods
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub affinity: Option<Affinity>,
    /// Resource requirements for operand containers
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub resources: Option<ResourceRequirements>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ca_ttl() -> String {
    "24h".to_string()
}

fn default_x509_svid_ttl() -> String {
    "1h".to_string()
}

fn default_jwt_svid_ttl() -> String {
    "5m".to_string()
}

fn default_agent_socket_name() -> String {
    "spire-agent.sock".to_string()
}

fn default_replica_count() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

/// Schema for core Kubernetes objects embedded in a spec; the API server already knows them
fn preserve_unknown_object(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    });
    Schema::try_from(schema_value).expect("Failed to create preserve-unknown-fields object schema")
}

fn preserve_unknown_list(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    });
    Schema::try_from(schema_value).expect("Failed to create preserve-unknown-fields list schema")
}
