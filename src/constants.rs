//! # Constants
//!
//! Defaults, label keys and well-known names shared across the operator.

/// API group of every record kind served by this operator
pub const API_GROUP: &str = "spire.identity.io";

/// Name every singleton record must carry
pub const SINGLETON_NAME: &str = "cluster";

/// Field manager / managed-by label value
pub const OPERATOR_NAME: &str = "spire-identity-operator";

/// Annotation on a primary record overriding the process-wide create-only default
pub const CREATE_ONLY_ANNOTATION: &str = "spire.identity.io/create-only";

/// Pod template annotation carrying the fingerprint of the ConfigMap a workload consumes
pub const CONFIG_HASH_ANNOTATION: &str = "spire.identity.io/config-hash";

// Standard label keys
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of `app.kubernetes.io/part-of` on every managed object
pub const PART_OF_VALUE: &str = "zero-trust-workload-identity-manager";

/// Default namespace operands are deployed into
pub const DEFAULT_OPERAND_NAMESPACE: &str = "zero-trust-workload-identity-manager";

/// Default periodic resync interval for successful passes (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default requeue interval after a failed pass (seconds)
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 30;

/// Requeue interval after the singleton record was recreated (seconds)
pub const SINGLETON_RECREATE_REQUEUE_SECS: u64 = 1;

/// Bounded retries for a status write that hits a resourceVersion conflict
pub const DEFAULT_STATUS_UPDATE_RETRIES: u32 = 5;

/// HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// HTTPS port of the admission webhook
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Default serving certificate for the admission webhook
pub const DEFAULT_WEBHOOK_CERT_PATH: &str = "/tmp/k8s-webhook-server/serving-certs/tls.crt";

/// Default serving key for the admission webhook
pub const DEFAULT_WEBHOOK_KEY_PATH: &str = "/tmp/k8s-webhook-server/serving-certs/tls.key";

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

// Operand images
pub const DEFAULT_SPIRE_SERVER_IMAGE: &str = "ghcr.io/spiffe/spire-server:1.12.4";
pub const DEFAULT_SPIRE_AGENT_IMAGE: &str = "ghcr.io/spiffe/spire-agent:1.12.4";
pub const DEFAULT_SPIRE_OIDC_DISCOVERY_PROVIDER_IMAGE: &str =
    "ghcr.io/spiffe/oidc-discovery-provider:1.12.4";

/// Prefix of the derived issuer default (`oidc-discovery.<trustDomain>`)
pub const DEFAULT_ISSUER_PREFIX: &str = "oidc-discovery";

// Condition types
pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_CONFIGURATION_VALID: &str = "ConfigurationValid";
pub const CONDITION_SERVICE_ACCOUNT_AVAILABLE: &str = "ServiceAccountAvailable";
pub const CONDITION_SERVICE_AVAILABLE: &str = "ServiceAvailable";
pub const CONDITION_CONFIG_MAP_AVAILABLE: &str = "ConfigMapAvailable";
pub const CONDITION_DEPLOYMENT_AVAILABLE: &str = "DeploymentAvailable";
pub const CONDITION_STATEFUL_SET_AVAILABLE: &str = "StatefulSetAvailable";
pub const CONDITION_DAEMON_SET_AVAILABLE: &str = "DaemonSetAvailable";
pub const CONDITION_ROUTE_AVAILABLE: &str = "RouteAvailable";
pub const CONDITION_CLUSTER_ROLE_AVAILABLE: &str = "ClusterRoleAvailable";
pub const CONDITION_CLUSTER_ROLE_BINDING_AVAILABLE: &str = "ClusterRoleBindingAvailable";
pub const CONDITION_OPERANDS_AVAILABLE: &str = "OperandsAvailable";

/// Reason of `RouteAvailable` while `managedRoute` is off
pub const ROUTE_DISABLED_REASON: &str = "ManagedRouteDisabled";
