//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciler metrics (passes, convergence outcomes, status writes, requeues)
//! - `webhook_metrics` - Admission webhook metrics (requests, decisions, latency)

pub mod controller_metrics;
pub mod registry;
pub mod webhook_metrics;

pub use controller_metrics::*;
pub use registry::*;
pub use webhook_metrics::*;
