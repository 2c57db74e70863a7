//! # Controller
//!
//! The reconciliation engine: change detection, the status manager, the convergence
//! primitive, the manifest builders and the per-kind reconcilers, plus the HTTP server
//! for probes and metrics.

pub mod converge;
pub mod diff;
pub mod manifests;
pub mod metadata;
pub mod reconciler;
pub mod server;
pub mod status;
