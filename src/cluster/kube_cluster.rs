//! # Kubernetes Implementation
//!
//! [`ClusterApi`] over `kube::Api`, mapping API status codes onto [`ClusterError`].
//! Failures that never reached the API server surface as [`ClusterError::Transport`].

use super::{object_name, ClusterApi, ManagedObject};
use crate::constants::OPERATOR_NAME;
use crate::error::ClusterError;
use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Client, ResourceExt};
use tracing::debug;

/// Control plane backed by a live Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..PostParams::default()
    }
}

fn map_kube_error<K: ManagedObject>(name: &str, err: kube::Error) -> ClusterError {
    match &err {
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            ClusterError::AlreadyExists {
                kind: K::kind_name(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(api_err) if api_err.code == 409 => ClusterError::Conflict {
            kind: K::kind_name(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 404 => ClusterError::NotFound {
            kind: K::kind_name(),
            name: name.to_string(),
        },
        kube::Error::Api(_) => ClusterError::Kube(err),
        _ => ClusterError::Transport(err.to_string()),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get<K: ManagedObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, ClusterError> {
        K::api(&self.client, namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error::<K>(name, e))
    }

    async fn create<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj)?;
        debug!(kind = %K::kind_name(), name = %name, "Creating object");
        K::api(&self.client, obj.namespace().as_deref())
            .create(&post_params(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(name, e))
    }

    async fn replace<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj)?;
        debug!(kind = %K::kind_name(), name = %name, "Updating object");
        K::api(&self.client, obj.namespace().as_deref())
            .replace(name, &post_params(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(name, e))
    }

    async fn replace_status<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj)?;
        debug!(kind = %K::kind_name(), name = %name, "Updating status");
        let body = serde_json::to_vec(obj)?;
        K::api(&self.client, obj.namespace().as_deref())
            .replace_status(name, &post_params(), body)
            .await
            .map_err(|e| map_kube_error::<K>(name, e))
    }
}
