//! # Operator Settings
//!
//! Reconciliation settings shared by every reconciler.

use super::{env_string_or_default, env_var_or_default};
use std::time::Duration;

/// Operator configuration
///
/// `create_only` is the process-wide default for create-only mode. A primary record can
/// override it per pass with the `spire.identity.io/create-only` annotation.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace every namespaced operand object is created in
    pub operand_namespace: String,
    /// Create missing objects but never update existing ones
    pub create_only: bool,
    /// Periodic resync interval after a successful pass (seconds)
    pub resync_interval_secs: u64,
    /// Requeue interval after a failed pass (seconds)
    pub error_requeue_secs: u64,
    /// Retries for a status write that hits a resourceVersion conflict
    pub status_update_retries: u32,
    /// SPIRE server container image
    pub spire_server_image: String,
    /// SPIRE agent container image
    pub spire_agent_image: String,
    /// SPIRE OIDC discovery provider container image
    pub oidc_discovery_provider_image: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            operand_namespace: DEFAULT_OPERAND_NAMESPACE.to_string(),
            create_only: false,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            error_requeue_secs: DEFAULT_ERROR_REQUEUE_SECS,
            status_update_retries: DEFAULT_STATUS_UPDATE_RETRIES,
            spire_server_image: DEFAULT_SPIRE_SERVER_IMAGE.to_string(),
            spire_agent_image: DEFAULT_SPIRE_AGENT_IMAGE.to_string(),
            oidc_discovery_provider_image: DEFAULT_SPIRE_OIDC_DISCOVERY_PROVIDER_IMAGE.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            operand_namespace: env_string_or_default("OPERAND_NAMESPACE", DEFAULT_OPERAND_NAMESPACE),
            create_only: env_var_or_default("CREATE_ONLY_MODE", false),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            error_requeue_secs: env_var_or_default("ERROR_REQUEUE_SECS", DEFAULT_ERROR_REQUEUE_SECS),
            status_update_retries: env_var_or_default(
                "STATUS_UPDATE_RETRIES",
                DEFAULT_STATUS_UPDATE_RETRIES,
            ),
            spire_server_image: env_string_or_default("SPIRE_SERVER_IMAGE", DEFAULT_SPIRE_SERVER_IMAGE),
            spire_agent_image: env_string_or_default("SPIRE_AGENT_IMAGE", DEFAULT_SPIRE_AGENT_IMAGE),
            oidc_discovery_provider_image: env_string_or_default(
                "SPIRE_OIDC_DISCOVERY_PROVIDER_IMAGE",
                DEFAULT_SPIRE_OIDC_DISCOVERY_PROVIDER_IMAGE,
            ),
        }
    }

    /// Interval before the next periodic pass
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Interval before retrying a failed pass
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}
