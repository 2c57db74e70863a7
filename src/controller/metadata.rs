//! # Object Metadata
//!
//! Standard labels, selectors and owner references carried by every managed object.

use crate::constants::{
    LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME, LABEL_PART_OF, OPERATOR_NAME,
    PART_OF_VALUE, SINGLETON_NAME,
};
use crate::crd::{IdentityRecord, RecordKind};
use crate::error::ReconcileError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

/// Standard labels for an object of the given component
pub fn standard_labels(kind: RecordKind, app_name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(kind, app_name);
    labels.insert(LABEL_PART_OF.to_string(), PART_OF_VALUE.to_string());
    labels.insert(LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
    labels
}

/// Custom labels merged under the standard ones; standard keys always win
pub fn with_custom_labels(
    standard: BTreeMap<String, String>,
    custom: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = custom.clone();
    merged.extend(standard);
    merged
}

/// Immutable subset of the standard labels used in workload selectors
pub fn selector_labels(kind: RecordKind, app_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), app_name.to_string()),
        (LABEL_INSTANCE.to_string(), SINGLETON_NAME.to_string()),
        (LABEL_COMPONENT.to_string(), kind.component().to_string()),
    ])
}

/// Label selector matching every object this operator manages for one record kind
pub fn managed_by_selector(kind: RecordKind) -> String {
    format!(
        "{LABEL_MANAGED_BY}={OPERATOR_NAME},{LABEL_COMPONENT}={}",
        kind.component()
    )
}

pub fn label_selector(kind: RecordKind, app_name: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(selector_labels(kind, app_name)),
        ..LabelSelector::default()
    }
}

/// Builds metadata for the objects one record owns
///
/// Every object gets the record as its controlling owner, so deleting the record
/// garbage-collects it.
#[derive(Debug, Clone)]
pub struct OwnedMeta {
    kind: RecordKind,
    namespace: String,
    owner: OwnerReference,
    custom_labels: BTreeMap<String, String>,
}

impl OwnedMeta {
    pub fn new<K: IdentityRecord>(record: &K, namespace: &str) -> Result<Self, ReconcileError> {
        let owner = record
            .controller_owner_ref(&())
            .ok_or_else(|| ReconcileError::Manifest {
                what: "owner reference",
                message: format!("{} has no name or uid", K::KIND),
            })?;
        Ok(Self {
            kind: K::KIND,
            namespace: namespace.to_string(),
            owner,
            custom_labels: record.custom_labels().clone(),
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn labels(&self, app_name: &str) -> BTreeMap<String, String> {
        with_custom_labels(standard_labels(self.kind, app_name), &self.custom_labels)
    }

    pub fn selector(&self, app_name: &str) -> LabelSelector {
        label_selector(self.kind, app_name)
    }

    /// Metadata for a namespaced object
    pub fn namespaced(&self, name: &str, app_name: &str) -> ObjectMeta {
        ObjectMeta {
            namespace: Some(self.namespace.clone()),
            ..self.cluster_scoped(name, app_name)
        }
    }

    /// Metadata for a cluster-scoped object
    pub fn cluster_scoped(&self, name: &str, app_name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(self.labels(app_name)),
            owner_references: Some(vec![self.owner.clone()]),
            ..ObjectMeta::default()
        }
    }
}
