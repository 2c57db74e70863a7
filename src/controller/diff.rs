//! # Change Detection
//!
//! Stable content fingerprints and the comparisons the convergence primitive uses to decide
//! whether an existing object must be updated. Every comparison ignores fields the API
//! server populates.

use crate::constants::CONFIG_HASH_ANNOTATION;
use k8s_openapi::api::core::v1::{ConfigMap, Container, PodTemplateSpec, Volume};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Order-independent fingerprint of a key/value data set
///
/// Entries are sorted by key and hashed with length prefixes, so no two distinct
/// data sets share an encoding.
pub fn fingerprint<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut sorted: Vec<(&str, &[u8])> = entries.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (key, value) in sorted {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a ConfigMap's `data` and `binaryData`
pub fn config_map_fingerprint(config_map: &ConfigMap) -> String {
    let data = config_map.data.iter().flatten().map(|(k, v)| (k.as_str(), v.as_bytes()));
    // binary keys share the key space with data keys, so they are tagged
    let binary: Vec<(String, &[u8])> = config_map
        .binary_data
        .iter()
        .flatten()
        .map(|(k, v)| (format!("binary:{k}"), v.0.as_slice()))
        .collect();
    fingerprint(data.chain(binary.iter().map(|(k, v)| (k.as_str(), *v))))
}

/// Label maps compared with `None` equal to empty
pub fn labels_equal(
    desired: Option<&BTreeMap<String, String>>,
    existing: Option<&BTreeMap<String, String>>,
) -> bool {
    let empty = BTreeMap::new();
    desired.unwrap_or(&empty) == existing.unwrap_or(&empty)
}

/// True when every desired annotation is present with the same value
///
/// Other writers (deployment controller, service-ca) add their own annotations, which
/// are kept.
pub fn annotations_present(
    desired: Option<&BTreeMap<String, String>>,
    existing: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let empty = BTreeMap::new();
    let existing = existing.unwrap_or(&empty);
    desired.iter().all(|(k, v)| existing.get(k) == Some(v))
}

fn config_hash(template: &PodTemplateSpec) -> Option<&str> {
    template
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(CONFIG_HASH_ANNOTATION))
        .map(String::as_str)
}

fn container_differs(desired: &Container, existing: &Container) -> bool {
    desired.name != existing.name
        || desired.image != existing.image
        || desired.args != existing.args
        || desired.command != existing.command
        || desired.env != existing.env
        || desired.volume_mounts != existing.volume_mounts
        || desired.resources.clone().unwrap_or_default()
            != existing.resources.clone().unwrap_or_default()
}

/// Volumes sorted by name, with the `defaultMode` fields the API server fills in cleared
fn comparable_volumes(template: &PodTemplateSpec) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = template
        .spec
        .iter()
        .flat_map(|s| s.volumes.iter().flatten())
        .cloned()
        .map(|mut v| {
            if let Some(source) = v.config_map.as_mut() {
                source.default_mode = None;
            }
            if let Some(source) = v.secret.as_mut() {
                source.default_mode = None;
            }
            if let Some(source) = v.projected.as_mut() {
                source.default_mode = None;
            }
            if let Some(source) = v.downward_api.as_mut() {
                source.default_mode = None;
            }
            v
        })
        .collect();
    volumes.sort_by(|a, b| a.name.cmp(&b.name));
    volumes
}

/// Compare the operator-owned parts of a pod template
///
/// Returns the first differing part, for logging. The config-hash annotation is
/// checked first: it is how ConfigMap drift reaches a workload whose own spec did
/// not change.
pub fn pod_template_differs(
    desired: &PodTemplateSpec,
    existing: &PodTemplateSpec,
) -> Option<&'static str> {
    if config_hash(desired) != config_hash(existing) {
        return Some("config hash");
    }

    let desired_labels = desired.metadata.as_ref().and_then(|m| m.labels.as_ref());
    let existing_labels = existing.metadata.as_ref().and_then(|m| m.labels.as_ref());
    if !labels_equal(desired_labels, existing_labels) {
        return Some("pod labels");
    }

    let (Some(desired_spec), Some(existing_spec)) = (&desired.spec, &existing.spec) else {
        return (desired.spec.is_some() != existing.spec.is_some()).then_some("pod spec");
    };

    if desired_spec.containers.len() != existing_spec.containers.len()
        || desired_spec
            .containers
            .iter()
            .zip(&existing_spec.containers)
            .any(|(d, e)| container_differs(d, e))
    {
        return Some("containers");
    }
    if comparable_volumes(desired) != comparable_volumes(existing) {
        return Some("volumes");
    }
    if desired_spec.service_account_name != existing_spec.service_account_name {
        return Some("service account");
    }
    if desired_spec.node_selector.clone().unwrap_or_default()
        != existing_spec.node_selector.clone().unwrap_or_default()
    {
        return Some("node selector");
    }
    if desired_spec.tolerations.clone().unwrap_or_default()
        != existing_spec.tolerations.clone().unwrap_or_default()
    {
        return Some("tolerations");
    }
    if desired_spec.affinity != existing_spec.affinity {
        return Some("affinity");
    }
    None
}
