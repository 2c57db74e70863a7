//! # Reconcilers
//!
//! One reconciler per record kind, all driven by [`run_pass`].
//!
//! A pass walks a fixed sequence of states and never loops back:
//!
//! ```text
//! FetchRecord -> ValidateInvariants -> EstablishOwnerLinks -> Converge steps... -> Idle
//! ```
//!
//! Any failing step aborts the rest of the pass. Whatever the outcome, the conditions
//! collected so far are flushed to the record's status before [`run_pass`] returns.

mod agent;
mod discovery;
mod scaffolding;
mod server;

pub use agent::AgentReconciler;
pub use discovery::DiscoveryProviderReconciler;
pub use scaffolding::ScaffoldingReconciler;
pub use server::ServerReconciler;

use super::status::StatusManager;
use crate::cluster::ClusterApi;
use crate::config::SharedOperatorConfig;
use crate::constants::{
    CONDITION_CONFIGURATION_VALID, CONDITION_READY, CREATE_ONLY_ANNOTATION, SINGLETON_NAME,
};
use crate::crd::{IdentityRecord, RecordKind, ZeroTrustWorkloadIdentityManager};
use crate::error::{ClusterError, ReconcileError, Result};
use crate::observability::metrics;
use crate::validation::check_record_fields;
use async_trait::async_trait;
use kube::Resource;
use tracing::{debug, info, instrument, warn};

/// Shared, read-only state every pass runs with
#[derive(Debug)]
pub struct Context<C> {
    pub cluster: C,
    pub config: SharedOperatorConfig,
}

impl<C: ClusterApi> Context<C> {
    pub fn new(cluster: C, config: SharedOperatorConfig) -> Self {
        Self { cluster, config }
    }
}

/// Mutable state of one pass
#[derive(Debug)]
pub struct PassState {
    pub status: StatusManager,
    /// Resolved once, before any convergence step
    pub create_only: bool,
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The record does not exist and is not a recreated singleton
    Idle,
    /// Every step ran
    Converged,
    /// The singleton was missing and has been recreated; requeue soon
    Recreated,
}

/// The per-kind part of a pass
#[async_trait]
pub trait RecordReconciler: Send + Sync {
    type Record: IdentityRecord;

    /// Record to create when `name` is missing; `None` for kinds that stay deleted
    fn recreate(&self, _name: &str) -> Option<Self::Record> {
        None
    }

    /// Converge everything the record owns, in order
    async fn pass<C: ClusterApi>(
        &self,
        ctx: &Context<C>,
        record: &Self::Record,
        state: &mut PassState,
    ) -> Result<()>;
}

/// Per-record create-only override, falling back to the process-wide default
pub fn resolve_create_only<K: IdentityRecord>(record: &K, default: bool) -> bool {
    let Some(value) = record.meta().annotations.as_ref().and_then(|a| a.get(CREATE_ONLY_ANNOTATION)) else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => true,
        "false" => false,
        other => {
            warn!(
                kind = %K::KIND,
                value = other,
                default,
                "Ignoring invalid {CREATE_ONLY_ANNOTATION} annotation"
            );
            default
        }
    }
}

/// Run one pass for the record called `name`
#[instrument(skip_all, fields(kind = %<R::Record as IdentityRecord>::KIND, name = %name))]
pub async fn run_pass<R, C>(reconciler: &R, ctx: &Context<C>, name: &str) -> Result<PassOutcome>
where
    R: RecordReconciler,
    C: ClusterApi,
{
    let kind = <R::Record as IdentityRecord>::KIND;
    let start = std::time::Instant::now();
    metrics::increment_passes(kind);

    let fetched = ctx
        .cluster
        .get::<R::Record>(None, name)
        .await
        .map_err(|source| ReconcileError::Fetch {
            kind: kind.kind_name(),
            name: name.to_string(),
            source,
        });
    let record = match fetched {
        Ok(Some(record)) => record,
        Ok(None) => return recreate_missing(reconciler, ctx, name).await,
        Err(e) => {
            metrics::increment_pass_errors(kind);
            return Err(e);
        }
    };

    let mut state = PassState {
        status: StatusManager::new(record.meta().generation, ctx.config.status_update_retries),
        create_only: resolve_create_only(&record, ctx.config.create_only),
    };
    debug!(create_only = state.create_only, "Starting pass");

    let (record, result) = drive(reconciler, ctx, record, &mut state).await;

    match &result {
        Ok(()) => state.status.add_condition(
            CONDITION_READY,
            "Ready",
            format!("all {kind} components are available"),
            true,
        ),
        Err(e) => state
            .status
            .add_condition(CONDITION_READY, e.ready_reason(), e.to_string(), false),
    }

    let flushed = state.status.flush(&ctx.cluster, &record).await;
    metrics::observe_pass_duration(kind, start.elapsed().as_secs_f64());

    match (result, flushed) {
        (Ok(()), Ok(_)) => {
            info!("Pass converged");
            Ok(PassOutcome::Converged)
        }
        (Ok(()), Err(e)) => {
            metrics::increment_pass_errors(kind);
            Err(ReconcileError::Status(e))
        }
        (Err(e), flushed) => {
            if let Err(status_err) = flushed {
                warn!(error = %status_err, "Failed to record failure in status");
            }
            metrics::increment_pass_errors(kind);
            Err(e)
        }
    }
}

/// Validation, owner links and the kind's steps; returns the latest copy of the record
async fn drive<R, C>(
    reconciler: &R,
    ctx: &Context<C>,
    mut record: R::Record,
    state: &mut PassState,
) -> (R::Record, Result<()>)
where
    R: RecordReconciler,
    C: ClusterApi,
{
    let kind = <R::Record as IdentityRecord>::KIND;

    if let Err(message) = check_record_fields(&record) {
        state.status.add_condition(
            CONDITION_CONFIGURATION_VALID,
            "InvalidConfiguration",
            message.clone(),
            false,
        );
        return (
            record,
            Err(ReconcileError::InvalidSpec {
                kind: kind.kind_name(),
                message,
            }),
        );
    }
    state.status.add_condition(
        CONDITION_CONFIGURATION_VALID,
        "Valid",
        "configuration is valid",
        true,
    );

    if kind != RecordKind::Scaffolding {
        match link_to_singleton(&ctx.cluster, &record).await {
            Ok(Some(updated)) => record = updated,
            Ok(None) => {}
            Err(e) => return (record, Err(e)),
        }
    }

    let result = reconciler.pass(ctx, &record, state).await;
    (record, result)
}

/// Add a (non-controlling) owner reference from an operand record to the scaffolding
/// singleton, when the singleton exists and the link is missing
async fn link_to_singleton<C, K>(cluster: &C, record: &K) -> Result<Option<K>>
where
    C: ClusterApi,
    K: IdentityRecord,
{
    let singleton = cluster
        .get::<ZeroTrustWorkloadIdentityManager>(None, SINGLETON_NAME)
        .await
        .map_err(ReconcileError::OwnerLink)?;
    let Some(owner) = singleton.as_ref().and_then(|s| s.owner_ref(&())) else {
        return Ok(None);
    };

    let linked = record
        .meta()
        .owner_references
        .iter()
        .flatten()
        .any(|existing| existing.uid == owner.uid);
    if linked {
        return Ok(None);
    }

    let mut updated = record.clone();
    updated
        .meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(owner);
    let updated = cluster
        .replace(&updated)
        .await
        .map_err(ReconcileError::OwnerLink)?;
    info!("Linked record to {}", RecordKind::Scaffolding);
    Ok(Some(updated))
}

async fn recreate_missing<R, C>(reconciler: &R, ctx: &Context<C>, name: &str) -> Result<PassOutcome>
where
    R: RecordReconciler,
    C: ClusterApi,
{
    let kind = <R::Record as IdentityRecord>::KIND;
    let Some(fresh) = reconciler.recreate(name) else {
        debug!("Record not found, nothing to do");
        return Ok(PassOutcome::Idle);
    };

    match ctx.cluster.create(&fresh).await {
        Ok(_) | Err(ClusterError::AlreadyExists { .. }) => {
            info!("Recreated missing singleton");
            metrics::increment_singleton_recreations(kind);
            Ok(PassOutcome::Recreated)
        }
        Err(source) => {
            metrics::increment_pass_errors(kind);
            Err(ReconcileError::Recreate {
                kind: kind.kind_name(),
                source,
            })
        }
    }
}
