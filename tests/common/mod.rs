//! In-memory control plane for integration tests
//!
//! Objects are stored as JSON keyed by kind, namespace and name. Writes get a fresh
//! resourceVersion, creates get a uid and generation 1, and spec changes bump the
//! generation. `replace` keeps the stored status; `replace_status` touches nothing else.
//! Faults can be queued per operation and kind.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use spire_identity_operator::cluster::{ClusterApi, ManagedObject};
use spire_identity_operator::config::OperatorConfig;
use spire_identity_operator::controller::reconciler::Context;
use spire_identity_operator::crd::{
    SpireAgent, SpireOidcDiscoveryProvider, SpireServer, ZeroTrustWorkloadIdentityManager,
    ZeroTrustWorkloadIdentityManagerSpec,
};
use spire_identity_operator::error::ClusterError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Replace,
    ReplaceStatus,
}

#[derive(Debug, Clone)]
pub enum Fault {
    AlreadyExists,
    Conflict,
    NotFound,
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct Write {
    pub op: Op,
    pub kind: String,
    pub name: String,
}

#[derive(Debug)]
struct QueuedFault {
    op: Op,
    kind: String,
    remaining: u32,
    fault: Fault,
}

type Key = (String, Option<String>, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    next_version: u64,
    writes: Vec<Write>,
    faults: Vec<QueuedFault>,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn take_fault(&mut self, op: Op, kind: &str, name: &str) -> Result<(), ClusterError> {
        let Some(idx) = self
            .faults
            .iter()
            .position(|f| f.op == op && f.kind == kind && f.remaining > 0)
        else {
            return Ok(());
        };
        let queued = &mut self.faults[idx];
        queued.remaining -= 1;
        let (kind, name) = (kind.to_string(), name.to_string());
        Err(match queued.fault.clone() {
            Fault::AlreadyExists => ClusterError::AlreadyExists { kind, name },
            Fault::Conflict => ClusterError::Conflict { kind, name },
            Fault::NotFound => ClusterError::NotFound { kind, name },
            Fault::Transport(message) => ClusterError::Transport(message),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

fn key_of<K: ManagedObject>(namespace: Option<&str>, name: &str) -> Key {
    (K::kind_name(), namespace.map(str::to_string), name.to_string())
}

fn without_bookkeeping(value: &Value) -> Value {
    let mut value = value.clone();
    if let Some(map) = value.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    value
}

fn resource_version(value: &Value) -> Option<String> {
    value["metadata"]["resourceVersion"].as_str().map(str::to_string)
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    /// Fail the next `times` calls of `op` on objects of kind `K`
    pub fn inject<K: ManagedObject>(&self, op: Op, fault: Fault, times: u32) {
        self.lock().faults.push(QueuedFault {
            op,
            kind: K::kind_name(),
            remaining: times,
            fault,
        });
    }

    /// Store an object without recording a write; returns the stored copy
    pub fn seed<K: ManagedObject>(&self, obj: K) -> K {
        let mut state = self.lock();
        let stored = Self::insert(&mut state, &obj).expect("seed object should serialize");
        serde_json::from_value(stored).expect("seeded object should deserialize")
    }

    /// Read an object without going through fault injection
    pub fn fetch<K: ManagedObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&key_of::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).expect("stored object should deserialize"))
    }

    /// Edit a stored object in place as another writer would; keeps its uid
    pub fn mutate<K: ManagedObject>(&self, namespace: Option<&str>, name: &str, edit: impl FnOnce(&mut K)) {
        let mut state = self.lock();
        let key = key_of::<K>(namespace, name);
        let stored = state.objects.get(&key).cloned().expect("object to mutate should exist");
        let mut obj: K = serde_json::from_value(stored).expect("stored object should deserialize");
        edit(&mut obj);
        obj.meta_mut().resource_version = Some(state.bump().to_string());
        let value = serde_json::to_value(&obj).expect("mutated object should serialize");
        state.objects.insert(key, value);
    }

    pub fn remove<K: ManagedObject>(&self, namespace: Option<&str>, name: &str) {
        self.lock().objects.remove(&key_of::<K>(namespace, name));
    }

    pub fn writes(&self) -> Vec<Write> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    fn insert<K: ManagedObject>(state: &mut State, obj: &K) -> Result<Value, ClusterError> {
        let version = state.bump();
        let mut obj = obj.clone();
        let meta = obj.meta_mut();
        meta.uid = Some(format!("uid-{version}"));
        meta.resource_version = Some(version.to_string());
        meta.generation = Some(1);
        let value = serde_json::to_value(&obj)?;
        let key = key_of::<K>(obj.meta().namespace.as_deref(), obj.meta().name.as_deref().unwrap_or_default());
        state.objects.insert(key, value.clone());
        Ok(value)
    }

    fn record(state: &mut State, op: Op, kind: String, name: &str) {
        state.writes.push(Write {
            op,
            kind,
            name: name.to_string(),
        });
    }

    fn get_sync<K: ManagedObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, ClusterError> {
        let mut state = self.lock();
        state.take_fault(Op::Get, &K::kind_name(), name)?;
        state
            .objects
            .get(&key_of::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(ClusterError::from)
    }

    fn create_sync<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        let kind = K::kind_name();
        let name = obj.meta().name.clone().ok_or_else(|| ClusterError::MissingName(kind.clone()))?;
        let mut state = self.lock();
        state.take_fault(Op::Create, &kind, &name)?;
        if state
            .objects
            .contains_key(&key_of::<K>(obj.meta().namespace.as_deref(), &name))
        {
            return Err(ClusterError::AlreadyExists { kind, name });
        }
        let stored = Self::insert(&mut state, obj)?;
        Self::record(&mut state, Op::Create, kind, &name);
        Ok(serde_json::from_value(stored)?)
    }

    fn load_for_write<K: ManagedObject>(
        state: &mut State,
        op: Op,
        obj: &K,
    ) -> Result<(Key, Value), ClusterError> {
        let kind = K::kind_name();
        let name = obj.meta().name.clone().ok_or_else(|| ClusterError::MissingName(kind.clone()))?;
        state.take_fault(op, &kind, &name)?;
        let key = key_of::<K>(obj.meta().namespace.as_deref(), &name);
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(ClusterError::NotFound { kind, name });
        };
        if let Some(version) = obj.meta().resource_version.as_deref() {
            if resource_version(&stored).as_deref() != Some(version) {
                return Err(ClusterError::Conflict { kind, name });
            }
        }
        Ok((key, stored))
    }

    fn replace_sync<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        let mut state = self.lock();
        let (key, stored) = Self::load_for_write(&mut state, Op::Replace, obj)?;

        let mut value = serde_json::to_value(obj)?;
        let generation = stored["metadata"]["generation"].as_i64().unwrap_or(1);
        let generation = if without_bookkeeping(&value) == without_bookkeeping(&stored) {
            generation
        } else {
            generation + 1
        };
        let version = state.bump();
        value["metadata"]["uid"] = stored["metadata"]["uid"].clone();
        value["metadata"]["generation"] = Value::from(generation);
        value["metadata"]["resourceVersion"] = Value::from(version.to_string());
        if let Some(map) = value.as_object_mut() {
            match stored.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }

        state.objects.insert(key.clone(), value.clone());
        Self::record(&mut state, Op::Replace, key.0, &key.2);
        Ok(serde_json::from_value(value)?)
    }

    fn replace_status_sync<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        let mut state = self.lock();
        let (key, mut stored) = Self::load_for_write(&mut state, Op::ReplaceStatus, obj)?;

        let incoming = serde_json::to_value(obj)?;
        let version = state.bump();
        if let Some(map) = stored.as_object_mut() {
            match incoming.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }
        stored["metadata"]["resourceVersion"] = Value::from(version.to_string());

        state.objects.insert(key.clone(), stored.clone());
        Self::record(&mut state, Op::ReplaceStatus, key.0, &key.2);
        Ok(serde_json::from_value(stored)?)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get<K: ManagedObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, ClusterError> {
        self.get_sync(namespace, name)
    }

    async fn create<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        self.create_sync(obj)
    }

    async fn replace<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        self.replace_sync(obj)
    }

    async fn replace_status<K: ManagedObject>(&self, obj: &K) -> Result<K, ClusterError> {
        self.replace_status_sync(obj)
    }
}

pub const NAMESPACE: &str = "zero-trust-workload-identity-manager";

pub fn context(cluster: FakeCluster) -> Context<FakeCluster> {
    context_with(cluster, OperatorConfig::default())
}

pub fn context_with(cluster: FakeCluster, config: OperatorConfig) -> Context<FakeCluster> {
    Context::new(cluster, Arc::new(config))
}

pub fn server(trust_domain: &str, cluster_name: &str, jwt_issuer: Option<&str>) -> SpireServer {
    let spec = serde_json::from_value(serde_json::json!({
        "trustDomain": trust_domain,
        "clusterName": cluster_name,
        "jwtIssuer": jwt_issuer,
    }))
    .expect("server spec should deserialize");
    SpireServer::new("cluster", spec)
}

pub fn agent(trust_domain: &str, cluster_name: &str) -> SpireAgent {
    let spec = serde_json::from_value(serde_json::json!({
        "trustDomain": trust_domain,
        "clusterName": cluster_name,
    }))
    .expect("agent spec should deserialize");
    SpireAgent::new("cluster", spec)
}

pub fn discovery_provider(trust_domain: &str, jwt_issuer: Option<&str>, managed_route: bool) -> SpireOidcDiscoveryProvider {
    let spec = serde_json::from_value(serde_json::json!({
        "trustDomain": trust_domain,
        "jwtIssuer": jwt_issuer,
        "managedRoute": managed_route,
    }))
    .expect("discovery provider spec should deserialize");
    SpireOidcDiscoveryProvider::new("cluster", spec)
}

pub fn scaffolding() -> ZeroTrustWorkloadIdentityManager {
    ZeroTrustWorkloadIdentityManager::new("cluster", ZeroTrustWorkloadIdentityManagerSpec::default())
}
