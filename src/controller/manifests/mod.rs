//! # Manifest Builders
//!
//! Pure functions turning a record into the desired state of each object it owns.
//! Builders are deterministic: the same record and configuration always produce
//! structurally equal manifests, which is what lets a second pass find nothing to do.

pub mod agent;
pub mod discovery;
pub mod scaffolding;
pub mod server;

use super::diff::config_map_fingerprint;
use super::metadata::OwnedMeta;
use crate::constants::CONFIG_HASH_ANNOTATION;
use crate::crd::CommonConfig;
use crate::error::ReconcileError;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, Service, ServiceAccount,
    ServicePort, ServiceSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

pub fn service_account(meta: &OwnedMeta, name: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta.namespaced(name, name),
        ..ServiceAccount::default()
    }
}

/// ClusterIP service exposing `port` and forwarding to the named container port
pub fn service(
    meta: &OwnedMeta,
    name: &str,
    port: i32,
    target_port: &str,
    annotations: Option<BTreeMap<String, String>>,
) -> Service {
    let mut metadata = meta.namespaced(name, name);
    metadata.annotations = annotations;
    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(super::metadata::selector_labels(meta.kind(), name)),
            ports: Some(vec![ServicePort {
                name: Some(target_port.to_string()),
                port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(target_port.to_string())),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// ConfigMap holding one pretty-printed JSON document under `key`
pub fn json_config_map(
    meta: &OwnedMeta,
    name: &str,
    key: &str,
    document: &serde_json::Value,
) -> Result<ConfigMap, ReconcileError> {
    let rendered = serde_json::to_string_pretty(document).map_err(|e| ReconcileError::Manifest {
        what: "ConfigMap",
        message: e.to_string(),
    })?;
    Ok(ConfigMap {
        metadata: meta.namespaced(name, name),
        data: Some(BTreeMap::from([(key.to_string(), rendered)])),
        ..ConfigMap::default()
    })
}

/// Fingerprint a workload's pod template is annotated with
pub fn config_hash(config_map: &ConfigMap) -> String {
    config_map_fingerprint(config_map)
}

/// Pod template carrying the selector labels and the ConfigMap fingerprint
pub fn pod_template(meta: &OwnedMeta, app_name: &str, config_hash: &str, spec: PodSpec) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(meta.labels(app_name)),
            annotations: Some(BTreeMap::from([(
                CONFIG_HASH_ANNOTATION.to_string(),
                config_hash.to_string(),
            )])),
            ..ObjectMeta::default()
        }),
        spec: Some(spec),
    }
}

/// Apply the record's scheduling hints to a pod spec and its containers
pub fn apply_scheduling(spec: &mut PodSpec, common: &CommonConfig) {
    if !common.node_selector.is_empty() {
        spec.node_selector = Some(common.node_selector.clone());
    }
    if !common.tolerations.is_empty() {
        spec.tolerations = Some(common.tolerations.clone());
    }
    spec.affinity.clone_from(&common.affinity);
    if let Some(resources) = &common.resources {
        for container in &mut spec.containers {
            container.resources = Some(resources.clone());
        }
    }
}

pub fn config_volume(volume_name: &str, config_map_name: &str) -> Volume {
    Volume {
        name: volume_name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name.to_string(),
            ..ConfigMapVolumeSource::default()
        }),
        ..Volume::default()
    }
}

/// Container running `image` with a single `-config` argument
pub fn config_container(name: &str, image: &str, config_path: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(vec!["-config".to_string(), config_path.to_string()]),
        ..Container::default()
    }
}

fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
