//! # Webhook Metrics
//!
//! Metrics for admission requests served by the validating webhook.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static ADMISSION_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_admission_requests_total",
            "Total number of admission requests by decision",
        ),
        &["kind", "operation", "decision"],
    )
    .expect("Failed to create ADMISSION_REQUESTS_TOTAL metric - this should never happen")
});

static ADMISSION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "spire_identity_operator_admission_duration_seconds",
            "Duration of admission validation in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["kind"],
    )
    .expect("Failed to create ADMISSION_DURATION metric - this should never happen")
});

/// Register webhook metrics with the registry
pub(crate) fn register_webhook_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ADMISSION_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMISSION_DURATION.clone()))?;
    Ok(())
}

pub fn increment_admission_requests(kind: &str, operation: &str, allowed: bool) {
    let decision = if allowed { "allowed" } else { "denied" };
    ADMISSION_REQUESTS_TOTAL
        .with_label_values(&[kind, operation, decision])
        .inc();
}

pub fn observe_admission_duration(kind: &str, duration: f64) {
    ADMISSION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}
