//! # Observability
//!
//! Prometheus metrics for the reconcilers and the admission webhook.

pub mod metrics;
