//! # Convergence
//!
//! Drives one managed object toward its desired manifest: get, then create, skip or
//! compare-and-update. Each kind decides what "equal" means through [`Convergent`].

use super::diff::{annotations_present, config_map_fingerprint, labels_equal, pod_template_differs};
use super::status::StatusManager;
use crate::cluster::{ClusterApi, ManagedObject};
use crate::crd::{RecordKind, Route};
use crate::error::{ClusterError, ConvergeError, ReconcileError};
use crate::observability::metrics;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;
use tracing::{debug, info};

/// Reason written to a step's condition when the object matches its manifest
pub const CONVERGED_REASON: &str = "Converged";

/// Result of converging one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeOutcome {
    Created,
    Updated,
    Unchanged,
}

impl ConvergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ConvergeOutcome::Created => "created",
            ConvergeOutcome::Updated => "updated",
            ConvergeOutcome::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ConvergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific change detection
pub trait Convergent: ManagedObject {
    /// Copy fields the API server populates from `existing` onto the desired object
    fn carry_over(&mut self, _existing: &Self) {}

    /// First operator-owned part of the spec that differs, if any
    fn differs(&self, existing: &Self) -> Option<&'static str>;
}

/// Labels, annotations and owner references the operator sets
fn metadata_differs(desired: &ObjectMeta, existing: &ObjectMeta) -> Option<&'static str> {
    if !labels_equal(desired.labels.as_ref(), existing.labels.as_ref()) {
        return Some("labels");
    }
    if !annotations_present(desired.annotations.as_ref(), existing.annotations.as_ref()) {
        return Some("annotations");
    }
    let existing_owners = existing.owner_references.as_deref().unwrap_or_default();
    let owners_present = desired
        .owner_references
        .iter()
        .flatten()
        .all(|owner| existing_owners.iter().any(|e| e.uid == owner.uid));
    if !owners_present {
        return Some("owner references");
    }
    None
}

/// Keep what other writers added to the object's metadata, then attach the current
/// resourceVersion
fn merge_metadata(desired: &mut ObjectMeta, existing: &ObjectMeta) {
    desired.resource_version = existing.resource_version.clone();

    if let Some(existing_annotations) = &existing.annotations {
        let mut annotations = existing_annotations.clone();
        annotations.extend(desired.annotations.take().unwrap_or_default());
        desired.annotations = Some(annotations);
    }

    let extra_owners: Vec<_> = existing
        .owner_references
        .iter()
        .flatten()
        .filter(|e| {
            !desired
                .owner_references
                .iter()
                .flatten()
                .any(|owner| owner.uid == e.uid)
        })
        .cloned()
        .collect();
    if !extra_owners.is_empty() {
        desired
            .owner_references
            .get_or_insert_with(Vec::new)
            .extend(extra_owners);
    }
}

/// Converge one object
///
/// A create that loses a race to another writer counts as success. In create-only mode
/// an existing object is never compared or updated. An update carries the existing
/// resourceVersion; a conflict is returned to the caller and retried on the next pass.
pub async fn converge<C, K>(
    cluster: &C,
    mut desired: K,
    create_only: bool,
) -> Result<ConvergeOutcome, ConvergeError>
where
    C: ClusterApi,
    K: Convergent,
{
    let kind = K::kind_name();
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| ConvergeError::MissingName(kind.clone()))?;
    let namespace = desired.meta().namespace.clone();

    let existing = cluster
        .get::<K>(namespace.as_deref(), &name)
        .await
        .map_err(|source| ConvergeError::Get {
            kind: kind.clone(),
            name: name.clone(),
            source,
        })?;

    let Some(existing) = existing else {
        return match cluster.create(&desired).await {
            Ok(_) => {
                info!(kind = %kind, name = %name, "Created object");
                Ok(ConvergeOutcome::Created)
            }
            Err(ClusterError::AlreadyExists { .. }) => {
                debug!(kind = %kind, name = %name, "Object created concurrently");
                Ok(ConvergeOutcome::Unchanged)
            }
            Err(source) => Err(ConvergeError::Create { kind, name, source }),
        };
    };

    if create_only {
        debug!(kind = %kind, name = %name, "Create-only mode, leaving existing object untouched");
        return Ok(ConvergeOutcome::Unchanged);
    }

    desired.carry_over(&existing);
    let difference =
        metadata_differs(desired.meta(), existing.meta()).or_else(|| desired.differs(&existing));
    let Some(difference) = difference else {
        return Ok(ConvergeOutcome::Unchanged);
    };

    info!(kind = %kind, name = %name, difference, "Updating object");
    merge_metadata(desired.meta_mut(), existing.meta());
    cluster
        .replace(&desired)
        .await
        .map_err(|source| ConvergeError::Update { kind, name, source })?;
    Ok(ConvergeOutcome::Updated)
}

/// One named convergence step of a pass
#[derive(Debug, Clone, Copy)]
pub struct Step {
    /// Condition the step reports, also used as the step name in errors
    pub condition: &'static str,
    pub record: RecordKind,
}

impl Step {
    pub const fn new(record: RecordKind, condition: &'static str) -> Self {
        Self { condition, record }
    }
}

/// Converge one object and report the result as the step's condition
///
/// A failure is recorded with the error's reason before it is returned, so the pass can
/// abort with its partial status intact.
pub async fn converge_step<C, K>(
    cluster: &C,
    status: &mut StatusManager,
    step: Step,
    desired: K,
    create_only: bool,
) -> Result<ConvergeOutcome, ReconcileError>
where
    C: ClusterApi,
    K: Convergent,
{
    let kind = K::kind_name();
    let name = desired.meta().name.clone().unwrap_or_default();

    match converge(cluster, desired, create_only).await {
        Ok(outcome) => {
            metrics::increment_converge_outcomes(step.record, &kind, outcome.as_str());
            status.add_condition(
                step.condition,
                CONVERGED_REASON,
                format!("{kind} {name} is available"),
                true,
            );
            Ok(outcome)
        }
        Err(source) => {
            metrics::increment_converge_outcomes(step.record, &kind, "error");
            status.add_condition(step.condition, source.reason(), source.to_string(), false);
            Err(ReconcileError::Step {
                step: step.condition,
                source,
            })
        }
    }
}

impl Convergent for ConfigMap {
    fn differs(&self, existing: &Self) -> Option<&'static str> {
        (config_map_fingerprint(self) != config_map_fingerprint(existing)).then_some("data")
    }
}

impl Convergent for Deployment {
    fn differs(&self, existing: &Self) -> Option<&'static str> {
        let (Some(desired), Some(current)) = (&self.spec, &existing.spec) else {
            return self.spec.is_some().then_some("spec");
        };
        if desired.replicas.unwrap_or(1) != current.replicas.unwrap_or(1) {
            return Some("replicas");
        }
        if desired.selector != current.selector {
            return Some("selector");
        }
        pod_template_differs(&desired.template, &current.template)
    }
}

impl Convergent for StatefulSet {
    fn differs(&self, existing: &Self) -> Option<&'static str> {
        let (Some(desired), Some(current)) = (&self.spec, &existing.spec) else {
            return self.spec.is_some().then_some("spec");
        };
        if desired.replicas.unwrap_or(1) != current.replicas.unwrap_or(1) {
            return Some("replicas");
        }
        if desired.service_name != current.service_name {
            return Some("service name");
        }
        if desired.selector != current.selector {
            return Some("selector");
        }
        pod_template_differs(&desired.template, &current.template)
    }
}

impl Convergent for DaemonSet {
    fn differs(&self, existing: &Self) -> Option<&'static str> {
        let (Some(desired), Some(current)) = (&self.spec, &existing.spec) else {
            return self.spec.is_some().then_some("spec");
        };
        if desired.selector != current.selector {
            return Some("selector");
        }
        pod_template_differs(&desired.template, &current.template)
    }
}

impl Convergent for Service {
    fn carry_over(&mut self, existing: &Self) {
        let (Some(desired), Some(current)) = (self.spec.as_mut(), existing.spec.as_ref()) else {
            return;
        };
        if desired.cluster_ip.is_none() {
            desired.cluster_ip = current.cluster_ip.clone();
        }
        if desired.cluster_ips.is_none() {
            desired.cluster_ips = current.cluster_ips.clone();
        }
        if desired.ip_families.is_none() {
            desired.ip_families = current.ip_families.clone();
        }
        if desired.ip_family_policy.is_none() {
            desired.ip_family_policy = current.ip_family_policy.clone();
        }
        if desired.internal_traffic_policy.is_none() {
            desired.internal_traffic_policy = current.internal_traffic_policy.clone();
        }
        if desired.session_affinity.is_none() {
            desired.session_affinity = current.session_affinity.clone();
        }
    }

    fn differs(&self, existing: &Self) -> Option<&'static str> {
        let (Some(desired), Some(current)) = (&self.spec, &existing.spec) else {
            return self.spec.is_some().then_some("spec");
        };
        if desired.type_ != current.type_ {
            return Some("type");
        }
        if desired.selector != current.selector {
            return Some("selector");
        }
        if desired.ports != current.ports {
            return Some("ports");
        }
        None
    }
}

impl Convergent for ServiceAccount {
    fn carry_over(&mut self, existing: &Self) {
        if self.secrets.is_none() {
            self.secrets = existing.secrets.clone();
        }
        if self.image_pull_secrets.is_none() {
            self.image_pull_secrets = existing.image_pull_secrets.clone();
        }
    }

    fn differs(&self, existing: &Self) -> Option<&'static str> {
        (self.automount_service_account_token != existing.automount_service_account_token)
            .then_some("automount")
    }
}

impl Convergent for ClusterRole {
    fn differs(&self, existing: &Self) -> Option<&'static str> {
        (self.rules.as_deref().unwrap_or_default() != existing.rules.as_deref().unwrap_or_default())
            .then_some("rules")
    }
}

impl Convergent for ClusterRoleBinding {
    fn differs(&self, existing: &Self) -> Option<&'static str> {
        if self.role_ref != existing.role_ref {
            return Some("role ref");
        }
        (self.subjects.as_deref().unwrap_or_default()
            != existing.subjects.as_deref().unwrap_or_default())
        .then_some("subjects")
    }
}

impl Convergent for Route {
    fn carry_over(&mut self, existing: &Self) {
        if self.spec.host.is_none() {
            self.spec.host = existing.spec.host.clone();
        }
    }

    fn differs(&self, existing: &Self) -> Option<&'static str> {
        (self.spec != existing.spec).then_some("route spec")
    }
}
