//! # Operator Configuration
//!
//! Process-level configuration loaded from environment variables (populated from the
//! operator Deployment).
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Configuration is read once at startup and never mutated afterwards; every reconciler and
//! the admission webhook receive the same immutable value behind an `Arc`.

mod operator;
mod server;

pub use operator::OperatorConfig;
pub use server::ServerConfig;

use std::sync::Arc;

/// Shared, read-only operator configuration
pub type SharedOperatorConfig = Arc<OperatorConfig>;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (OperatorConfig, ServerConfig) {
    (OperatorConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a string environment variable or return the default
pub(crate) fn env_string_or_default(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
