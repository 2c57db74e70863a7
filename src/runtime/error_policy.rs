//! # Error Policy
//!
//! Requeue decisions for failed passes and classification of controller stream errors.
//!
//! Failed passes requeue after a fixed interval. No per-record error counts are kept in
//! memory; a pass starts from the cluster's state alone.

use crate::controller::reconciler::Context;
use crate::crd::{IdentityRecord, RecordKind};
use crate::error::ReconcileError;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, warn};

/// Handle a failed pass
///
/// Invalid specs wait for the record to change; everything else is retried after
/// the configured error requeue interval.
pub fn handle_reconciliation_error<K, C>(
    record: Arc<K>,
    error: &ReconcileError,
    ctx: Arc<Context<C>>,
) -> Action
where
    K: IdentityRecord,
{
    let name = record.name_any();
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %K::KIND,
        resource.name = %name,
        error = %error
    );
    let _error_guard = error_span.enter();

    if !error.is_retryable() {
        warn!("{} {} has an invalid spec, waiting for it to change: {}", K::KIND, name, error);
        observability::metrics::increment_requeues_total(K::KIND, "invalid-spec");
        return Action::await_change();
    }

    let requeue = ctx.config.error_requeue();
    error!(
        "Reconciliation error for {} {}: {}; retrying in {}s",
        K::KIND,
        name,
        error,
        requeue.as_secs()
    );
    observability::metrics::increment_requeues_total(K::KIND, "error");
    Action::requeue(requeue)
}

/// How the watch loop treats a controller stream error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamErrorAction {
    /// The named singleton is missing and must be recreated
    RecreateSingleton(String),
    /// Logged; the controller keeps running
    Continue,
}

/// Classify a controller stream error for `kind`
pub fn classify_stream_error(
    kind: RecordKind,
    error: &kube_runtime::controller::Error<ReconcileError, kube_runtime::watcher::Error>,
) -> StreamErrorAction {
    use kube_runtime::controller::Error;
    match error {
        Error::ObjectNotFound(obj_ref) if kind == RecordKind::Scaffolding => {
            StreamErrorAction::RecreateSingleton(obj_ref.name.clone())
        }
        Error::ObjectNotFound(obj_ref) => {
            warn!("{} {} not found (likely deleted), continuing watch", kind, obj_ref.name);
            StreamErrorAction::Continue
        }
        Error::ReconcilerFailed(_, _) => StreamErrorAction::Continue,
        other => {
            error!("Controller stream error for {}: {}", kind, other);
            StreamErrorAction::Continue
        }
    }
}
