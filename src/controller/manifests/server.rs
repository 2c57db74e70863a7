//! SPIRE server: ServiceAccount, Service, ConfigMap and StatefulSet.

use super::{
    apply_scheduling, config_container, config_volume, json_config_map, pod_template,
    service, service_account,
};
use crate::config::OperatorConfig;
use crate::controller::metadata::OwnedMeta;
use crate::crd::SpireServer;
use crate::error::ReconcileError;
use crate::validation::normalize_issuer;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerPort, HTTPGetAction, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PodSpec, Probe, Service, ServiceAccount, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;
use std::collections::BTreeMap;

pub const NAME: &str = "spire-server";
pub const CONFIG_KEY: &str = "server.conf";
pub const GRPC_PORT: i32 = 8081;
pub const HEALTH_PORT: i32 = 8080;
const DATA_VOLUME: &str = "spire-data";
const CONFIG_VOLUME: &str = "spire-config";

pub fn build_service_account(meta: &OwnedMeta) -> ServiceAccount {
    service_account(meta, NAME)
}

pub fn build_service(meta: &OwnedMeta) -> Service {
    service(meta, NAME, 443, "grpc", None)
}

pub fn build_config_map(
    record: &SpireServer,
    meta: &OwnedMeta,
) -> Result<ConfigMap, ReconcileError> {
    let spec = &record.spec;
    let issuer = normalize_issuer(spec.jwt_issuer.as_deref().unwrap_or_default(), &spec.trust_domain);
    let document = json!({
        "server": {
            "bind_address": "0.0.0.0",
            "bind_port": GRPC_PORT.to_string(),
            "trust_domain": spec.trust_domain,
            "data_dir": "/run/spire/data",
            "log_level": spec.log_level.to_uppercase(),
            "ca_ttl": spec.ca_ttl,
            "default_x509_svid_ttl": spec.default_x509_svid_ttl,
            "default_jwt_svid_ttl": spec.default_jwt_svid_ttl,
            "jwt_issuer": format!("https://{issuer}"),
            "ca_subject": [{
                "country": ["US"],
                "organization": ["SPIRE"],
                "common_name": spec.trust_domain,
            }],
        },
        "plugins": {
            "DataStore": [{ "sql": { "plugin_data": {
                "database_type": "sqlite3",
                "connection_string": "/run/spire/data/datastore.sqlite3",
            }}}],
            "KeyManager": [{ "disk": { "plugin_data": {
                "keys_path": "/run/spire/data/keys.json",
            }}}],
            "NodeAttestor": [{ "k8s_psat": { "plugin_data": {
                "clusters": [{
                    spec.cluster_name.clone(): {
                        "service_account_allow_list": [
                            format!("{}:{}", meta.namespace(), super::agent::NAME)
                        ],
                    },
                }],
            }}}],
            "Notifier": [{ "k8sbundle": { "plugin_data": {
                "namespace": meta.namespace(),
                "config_map": "spire-bundle",
            }}}],
        },
        "health_checks": {
            "listener_enabled": true,
            "bind_address": "0.0.0.0",
            "bind_port": HEALTH_PORT.to_string(),
            "live_path": "/live",
            "ready_path": "/ready",
        },
    });
    json_config_map(meta, NAME, CONFIG_KEY, &document)
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String("healthz".to_string()),
            ..HTTPGetAction::default()
        }),
        ..Probe::default()
    }
}

pub fn build_stateful_set(
    record: &SpireServer,
    meta: &OwnedMeta,
    config: &OperatorConfig,
    config_hash: &str,
) -> StatefulSet {
    let mut container = config_container(
        NAME,
        &config.spire_server_image,
        &format!("/run/spire/config/{CONFIG_KEY}"),
    );
    container.ports = Some(vec![
        ContainerPort {
            name: Some("grpc".to_string()),
            container_port: GRPC_PORT,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        },
        ContainerPort {
            name: Some("healthz".to_string()),
            container_port: HEALTH_PORT,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        },
    ]);
    container.volume_mounts = Some(vec![
        VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: "/run/spire/config".to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        },
        VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: "/run/spire/data".to_string(),
            ..VolumeMount::default()
        },
    ]);
    container.liveness_probe = Some(http_probe("/live"));
    container.readiness_probe = Some(http_probe("/ready"));

    let mut pod_spec = PodSpec {
        service_account_name: Some(NAME.to_string()),
        containers: vec![container],
        volumes: Some(vec![config_volume(CONFIG_VOLUME, NAME)]),
        ..PodSpec::default()
    };
    apply_scheduling(&mut pod_spec, &record.spec.common);

    let data_claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity("1Gi".to_string()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    };

    StatefulSet {
        metadata: meta.namespaced(NAME, NAME),
        spec: Some(StatefulSetSpec {
            replicas: Some(record.spec.replicas),
            service_name: NAME.to_string().into(),
            selector: meta.selector(NAME),
            template: pod_template(meta, NAME, config_hash, pod_spec),
            volume_claim_templates: Some(vec![data_claim]),
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    }
}
