//! # Control-Plane Seam
//!
//! Everything the operator reads or writes goes through [`ClusterApi`]: typed get, create,
//! update and status update, each carrying the object's resourceVersion. [`KubeCluster`]
//! implements it over `kube::Api`.

mod kube_cluster;

pub use kube_cluster::KubeCluster;

use crate::crd::{
    Route, SpireAgent, SpireOidcDiscoveryProvider, SpireServer, ZeroTrustWorkloadIdentityManager,
};
use crate::error::ClusterError;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A typed object the operator can read and write
pub trait ManagedObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// API handle scoped the way this kind is scoped
    fn api(client: &Client, namespace: Option<&str>) -> Api<Self>;

    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }
}

macro_rules! namespaced_objects {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ManagedObject for $ty {
                fn api(client: &Client, namespace: Option<&str>) -> Api<Self> {
                    match namespace {
                        Some(ns) => Api::namespaced(client.clone(), ns),
                        None => Api::default_namespaced(client.clone()),
                    }
                }
            }
        )*
    };
}

macro_rules! cluster_objects {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ManagedObject for $ty {
                fn api(client: &Client, _namespace: Option<&str>) -> Api<Self> {
                    Api::all(client.clone())
                }
            }
        )*
    };
}

namespaced_objects!(
    ConfigMap,
    Service,
    ServiceAccount,
    Deployment,
    StatefulSet,
    DaemonSet,
    Route,
);

cluster_objects!(
    ClusterRole,
    ClusterRoleBinding,
    SpireServer,
    SpireAgent,
    SpireOidcDiscoveryProvider,
    ZeroTrustWorkloadIdentityManager,
);

/// Declarative control plane: per-object reads and optimistic-concurrency writes
///
/// - `get` maps "not found" to `Ok(None)`
/// - `create` fails with [`ClusterError::AlreadyExists`] when the name is taken
/// - `replace` and `replace_status` fail with [`ClusterError::Conflict`] when the
///   object's resourceVersion is stale
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get<K: ManagedObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, ClusterError>;

    async fn create<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError>;

    async fn replace<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError>;

    async fn replace_status<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError>;
}

/// Name of an object handed to the seam
pub fn object_name<K: ManagedObject>(obj: &K) -> Result<&str, ClusterError> {
    obj.meta()
        .name
        .as_deref()
        .ok_or_else(|| ClusterError::MissingName(K::kind_name()))
}
