//! SPIRE agent: ServiceAccount, ConfigMap and DaemonSet.

use super::{apply_scheduling, config_container, config_volume, json_config_map, pod_template, service_account};
use crate::config::OperatorConfig;
use crate::controller::metadata::OwnedMeta;
use crate::crd::SpireAgent;
use crate::error::ReconcileError;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, HostPathVolumeSource, PodSpec, ProjectedVolumeSource,
    ServiceAccount, ServiceAccountTokenProjection, Volume, VolumeMount, VolumeProjection,
};
use serde_json::json;

pub const NAME: &str = "spire-agent";
pub const CONFIG_KEY: &str = "agent.conf";
pub const SOCKET_DIR: &str = "/run/spire/agent-sockets";
const CONFIG_VOLUME: &str = "spire-config";
const BUNDLE_VOLUME: &str = "spire-bundle";
const SOCKET_VOLUME: &str = "spire-agent-socket-dir";
const TOKEN_VOLUME: &str = "spire-token";

pub fn build_service_account(meta: &OwnedMeta) -> ServiceAccount {
    service_account(meta, NAME)
}

pub fn build_config_map(record: &SpireAgent, meta: &OwnedMeta) -> Result<ConfigMap, ReconcileError> {
    let spec = &record.spec;
    let document = json!({
        "agent": {
            "data_dir": "/run/spire",
            "log_level": spec.log_level.to_uppercase(),
            "server_address": format!("{}.{}", super::server::NAME, meta.namespace()),
            "server_port": "443",
            "socket_path": format!("{SOCKET_DIR}/spire-agent.sock"),
            "trust_bundle_path": "/run/spire/bundle/bundle.crt",
            "trust_domain": spec.trust_domain,
        },
        "plugins": {
            "NodeAttestor": [{ "k8s_psat": { "plugin_data": {
                "cluster": spec.cluster_name,
                "token_path": "/var/run/secrets/tokens/spire-agent",
            }}}],
            "KeyManager": [{ "memory": { "plugin_data": {} } }],
            "WorkloadAttestor": [{ "k8s": { "plugin_data": {
                "skip_kubelet_verification": spec.skip_kubelet_verification,
            }}}],
        },
        "health_checks": {
            "listener_enabled": true,
            "bind_address": "0.0.0.0",
            "bind_port": "9982",
            "live_path": "/live",
            "ready_path": "/ready",
        },
    });
    json_config_map(meta, NAME, CONFIG_KEY, &document)
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(read_only),
        ..VolumeMount::default()
    }
}

pub fn build_daemon_set(
    record: &SpireAgent,
    meta: &OwnedMeta,
    config: &OperatorConfig,
    config_hash: &str,
) -> DaemonSet {
    let mut container = config_container(
        NAME,
        &config.spire_agent_image,
        &format!("/run/spire/config/{CONFIG_KEY}"),
    );
    container.volume_mounts = Some(vec![
        mount(CONFIG_VOLUME, "/run/spire/config", true),
        mount(BUNDLE_VOLUME, "/run/spire/bundle", true),
        mount(SOCKET_VOLUME, SOCKET_DIR, false),
        mount(TOKEN_VOLUME, "/var/run/secrets/tokens", true),
    ]);

    let volumes = vec![
        config_volume(CONFIG_VOLUME, NAME),
        config_volume(BUNDLE_VOLUME, "spire-bundle"),
        Volume {
            name: SOCKET_VOLUME.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: SOCKET_DIR.to_string(),
                type_: Some("DirectoryOrCreate".to_string()),
            }),
            ..Volume::default()
        },
        Volume {
            name: TOKEN_VOLUME.to_string(),
            projected: Some(ProjectedVolumeSource {
                sources: Some(vec![VolumeProjection {
                    service_account_token: Some(ServiceAccountTokenProjection {
                        path: NAME.to_string(),
                        audience: Some(super::server::NAME.to_string()),
                        expiration_seconds: Some(7200),
                    }),
                    ..VolumeProjection::default()
                }]),
                ..ProjectedVolumeSource::default()
            }),
            ..Volume::default()
        },
    ];

    let mut pod_spec = PodSpec {
        service_account_name: Some(NAME.to_string()),
        host_pid: Some(true),
        host_network: Some(true),
        dns_policy: Some("ClusterFirstWithHostNet".to_string()),
        containers: vec![container],
        volumes: Some(volumes),
        ..PodSpec::default()
    };
    apply_scheduling(&mut pod_spec, &record.spec.common);

    DaemonSet {
        metadata: meta.namespaced(NAME, NAME),
        spec: Some(DaemonSetSpec {
            selector: meta.selector(NAME),
            template: pod_template(meta, NAME, config_hash, pod_spec),
            ..DaemonSetSpec::default()
        }),
        ..DaemonSet::default()
    }
}
