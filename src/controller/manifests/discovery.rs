//! OIDC discovery provider: ServiceAccount, Service, ConfigMap, Deployment and Route.

use super::{
    apply_scheduling, config_container, config_volume, json_config_map, pod_template, service,
    service_account, string_map,
};
use crate::config::OperatorConfig;
use crate::controller::metadata::OwnedMeta;
use crate::crd::{Route, RoutePort, RouteSpec, RouteTargetReference, RouteTls, SpireOidcDiscoveryProvider};
use crate::error::ReconcileError;
use crate::validation::{issuer_host, normalize_issuer};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    CSIVolumeSource, ConfigMap, ContainerPort, HTTPGetAction, PodSpec, Probe, SecretVolumeSource,
    Service, ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;

pub const NAME: &str = "spire-spiffe-oidc-discovery-provider";
pub const ROUTE_NAME: &str = "spire-oidc-discovery-provider";
pub const CONFIG_KEY: &str = "oidc-discovery-provider.conf";
pub const HTTPS_PORT: i32 = 8443;
const HEALTH_PORT: i32 = 8008;
const SERVING_CERT_SECRET: &str = "oidc-serving-cert";
const CONFIG_VOLUME: &str = "spire-oidc-config";
const WORKLOAD_API_VOLUME: &str = "spiffe-workload-api";
const TLS_VOLUME: &str = "tls";

/// Issuer host the provider answers for and the Route exposes
pub fn served_host(record: &SpireOidcDiscoveryProvider) -> String {
    let spec = &record.spec;
    let normalized = normalize_issuer(spec.jwt_issuer.as_deref().unwrap_or_default(), &spec.trust_domain);
    issuer_host(&normalized).to_string()
}

pub fn build_service_account(meta: &OwnedMeta) -> ServiceAccount {
    service_account(meta, NAME)
}

pub fn build_service(meta: &OwnedMeta) -> Service {
    let annotations = string_map(&[(
        "service.beta.openshift.io/serving-cert-secret-name",
        SERVING_CERT_SECRET,
    )]);
    service(meta, NAME, 443, "https", Some(annotations))
}

pub fn build_config_map(
    record: &SpireOidcDiscoveryProvider,
    meta: &OwnedMeta,
) -> Result<ConfigMap, ReconcileError> {
    let spec = &record.spec;
    let namespace = meta.namespace();
    let document = json!({
        "domains": [
            NAME,
            format!("{NAME}.{namespace}"),
            format!("{NAME}.{namespace}.svc.cluster.local"),
            served_host(record),
        ],
        "health_checks": {
            "bind_port": HEALTH_PORT.to_string(),
            "live_path": "/live",
            "ready_path": "/ready",
        },
        "log_level": spec.log_level.to_lowercase(),
        "serving_cert_file": {
            "addr": format!(":{HTTPS_PORT}"),
            "cert_file_path": "/etc/oidc/tls/tls.crt",
            "key_file_path": "/etc/oidc/tls/tls.key",
        },
        "workload_api": {
            "socket_path": format!("/spiffe-workload-api/{}", spec.agent_socket_name),
            "trust_domain": spec.trust_domain,
        },
    });
    json_config_map(meta, NAME, CONFIG_KEY, &document)
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(HEALTH_PORT),
            ..HTTPGetAction::default()
        }),
        ..Probe::default()
    }
}

pub fn build_deployment(
    record: &SpireOidcDiscoveryProvider,
    meta: &OwnedMeta,
    config: &OperatorConfig,
    config_hash: &str,
) -> Deployment {
    let mut container = config_container(
        NAME,
        &config.oidc_discovery_provider_image,
        &format!("/run/spire/oidc/config/{CONFIG_KEY}"),
    );
    container.ports = Some(vec![ContainerPort {
        name: Some("https".to_string()),
        container_port: HTTPS_PORT,
        protocol: Some("TCP".to_string()),
        ..ContainerPort::default()
    }]);
    container.volume_mounts = Some(vec![
        VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: "/run/spire/oidc/config".to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        },
        VolumeMount {
            name: WORKLOAD_API_VOLUME.to_string(),
            mount_path: "/spiffe-workload-api".to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        },
        VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: "/etc/oidc/tls".to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        },
    ]);
    container.liveness_probe = Some(http_probe("/live"));
    container.readiness_probe = Some(http_probe("/ready"));

    let volumes = vec![
        config_volume(CONFIG_VOLUME, NAME),
        Volume {
            name: WORKLOAD_API_VOLUME.to_string(),
            csi: Some(CSIVolumeSource {
                driver: "csi.spiffe.io".to_string(),
                read_only: Some(true),
                ..CSIVolumeSource::default()
            }),
            ..Volume::default()
        },
        Volume {
            name: TLS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(SERVING_CERT_SECRET.to_string()),
                ..SecretVolumeSource::default()
            }),
            ..Volume::default()
        },
    ];

    let mut pod_spec = PodSpec {
        service_account_name: Some(NAME.to_string()),
        containers: vec![container],
        volumes: Some(volumes),
        ..PodSpec::default()
    };
    apply_scheduling(&mut pod_spec, &record.spec.common);

    Deployment {
        metadata: meta.namespaced(NAME, NAME),
        spec: Some(DeploymentSpec {
            replicas: Some(record.spec.replica_count),
            selector: meta.selector(NAME),
            template: pod_template(meta, NAME, config_hash, pod_spec),
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Externally reachable route for the issuer host, re-encrypting to the service
pub fn build_route(record: &SpireOidcDiscoveryProvider, meta: &OwnedMeta) -> Route {
    let mut route = Route::new(
        ROUTE_NAME,
        RouteSpec {
            host: Some(served_host(record)),
            path: None,
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: NAME.to_string(),
                weight: Some(100),
            },
            port: Some(RoutePort {
                target_port: IntOrString::String("https".to_string()),
            }),
            tls: Some(RouteTls {
                termination: "reencrypt".to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
            wildcard_policy: Some("None".to_string()),
        },
    );
    route.metadata = meta.namespaced(ROUTE_NAME, NAME);
    route
}
