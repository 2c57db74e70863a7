//! # Controller Metrics
//!
//! Metrics for reconciler passes: passes, errors, durations, convergence outcomes,
//! status writes and requeues.

use crate::crd::RecordKind;
use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

// Pass metrics
static PASSES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_passes_total",
            "Total number of reconciler passes",
        ),
        &["kind"],
    )
    .expect("Failed to create PASSES_TOTAL metric - this should never happen")
});

static PASS_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_pass_errors_total",
            "Total number of reconciler passes that failed",
        ),
        &["kind"],
    )
    .expect("Failed to create PASS_ERRORS_TOTAL metric - this should never happen")
});

static PASS_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "spire_identity_operator_pass_duration_seconds",
            "Duration of reconciler passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["kind"],
    )
    .expect("Failed to create PASS_DURATION metric - this should never happen")
});

// Convergence metrics
static CONVERGE_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_converge_outcomes_total",
            "Outcomes of converging managed objects",
        ),
        &["kind", "object_kind", "outcome"],
    )
    .expect("Failed to create CONVERGE_OUTCOMES_TOTAL metric - this should never happen")
});

static STATUS_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_status_writes_total",
            "Total number of status sub-resource writes",
        ),
        &["kind"],
    )
    .expect("Failed to create STATUS_WRITES_TOTAL metric - this should never happen")
});

static SINGLETON_RECREATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_singleton_recreations_total",
            "Total number of missing singleton records recreated",
        ),
        &["kind"],
    )
    .expect("Failed to create SINGLETON_RECREATIONS_TOTAL metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "spire_identity_operator_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(PASSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_DURATION.clone()))?;
    REGISTRY.register(Box::new(CONVERGE_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SINGLETON_RECREATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_passes(kind: RecordKind) {
    PASSES_TOTAL.with_label_values(&[kind.metric_label()]).inc();
}

pub fn increment_pass_errors(kind: RecordKind) {
    PASS_ERRORS_TOTAL
        .with_label_values(&[kind.metric_label()])
        .inc();
}

pub fn observe_pass_duration(kind: RecordKind, duration: f64) {
    PASS_DURATION
        .with_label_values(&[kind.metric_label()])
        .observe(duration);
}

pub fn increment_converge_outcomes(kind: RecordKind, object_kind: &str, outcome: &str) {
    CONVERGE_OUTCOMES_TOTAL
        .with_label_values(&[kind.metric_label(), object_kind, outcome])
        .inc();
}

pub fn increment_status_writes(kind: RecordKind) {
    STATUS_WRITES_TOTAL
        .with_label_values(&[kind.metric_label()])
        .inc();
}

pub fn increment_singleton_recreations(kind: RecordKind) {
    SINGLETON_RECREATIONS_TOTAL
        .with_label_values(&[kind.metric_label()])
        .inc();
}

pub fn increment_requeues_total(kind: RecordKind, reason: &str) {
    REQUEUES_TOTAL
        .with_label_values(&[kind.metric_label(), reason])
        .inc();
}
