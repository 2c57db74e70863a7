//! # Record Kinds
//!
//! Uniform access to the fields the reconcilers, status manager and admission validator
//! need from every record kind.

use super::{
    RecordStatus, SpireAgent, SpireOidcDiscoveryProvider, SpireServer,
    ZeroTrustWorkloadIdentityManager,
};
use crate::cluster::ManagedObject;
use std::collections::BTreeMap;
use std::fmt;

/// The record kinds this operator reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Server,
    Agent,
    DiscoveryProvider,
    Scaffolding,
}

impl RecordKind {
    /// Kubernetes kind name
    pub fn kind_name(self) -> &'static str {
        match self {
            RecordKind::Server => "SpireServer",
            RecordKind::Agent => "SpireAgent",
            RecordKind::DiscoveryProvider => "SpireOidcDiscoveryProvider",
            RecordKind::Scaffolding => "ZeroTrustWorkloadIdentityManager",
        }
    }

    /// Value of the `app.kubernetes.io/component` label on objects this kind manages
    pub fn component(self) -> &'static str {
        match self {
            RecordKind::Server => "control-plane",
            RecordKind::Agent => "node-agent",
            RecordKind::DiscoveryProvider => "discovery",
            RecordKind::Scaffolding => "scaffolding",
        }
    }

    /// Label value used for metrics and log fields
    pub fn metric_label(self) -> &'static str {
        match self {
            RecordKind::Server => "spire_server",
            RecordKind::Agent => "spire_agent",
            RecordKind::DiscoveryProvider => "spire_oidc_discovery_provider",
            RecordKind::Scaffolding => "ztwim",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// A configuration record: a cluster-scoped singleton with the shared status type
pub trait IdentityRecord: ManagedObject {
    const KIND: RecordKind;

    fn status(&self) -> Option<&RecordStatus>;

    fn set_status(&mut self, status: RecordStatus);

    /// Custom label overrides from the spec
    fn custom_labels(&self) -> &BTreeMap<String, String>;

    /// `None` when the kind does not declare a trust domain
    fn trust_domain(&self) -> Option<&str> {
        None
    }

    /// `None` when the kind does not declare a cluster name
    fn cluster_name(&self) -> Option<&str> {
        None
    }

    /// Raw issuer; `Some("")` when the kind declares the field but leaves it unset
    fn jwt_issuer(&self) -> Option<&str> {
        None
    }
}

impl IdentityRecord for SpireServer {
    const KIND: RecordKind = RecordKind::Server;

    fn status(&self) -> Option<&RecordStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = Some(status);
    }

    fn custom_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.common.labels
    }

    fn trust_domain(&self) -> Option<&str> {
        Some(&self.spec.trust_domain)
    }

    fn cluster_name(&self) -> Option<&str> {
        Some(&self.spec.cluster_name)
    }

    fn jwt_issuer(&self) -> Option<&str> {
        Some(self.spec.jwt_issuer.as_deref().unwrap_or_default())
    }
}

impl IdentityRecord for SpireAgent {
    const KIND: RecordKind = RecordKind::Agent;

    fn status(&self) -> Option<&RecordStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = Some(status);
    }

    fn custom_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.common.labels
    }

    fn trust_domain(&self) -> Option<&str> {
        Some(&self.spec.trust_domain)
    }

    fn cluster_name(&self) -> Option<&str> {
        Some(&self.spec.cluster_name)
    }
}

impl IdentityRecord for SpireOidcDiscoveryProvider {
    const KIND: RecordKind = RecordKind::DiscoveryProvider;

    fn status(&self) -> Option<&RecordStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = Some(status);
    }

    fn custom_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.common.labels
    }

    fn trust_domain(&self) -> Option<&str> {
        Some(&self.spec.trust_domain)
    }

    fn jwt_issuer(&self) -> Option<&str> {
        Some(self.spec.jwt_issuer.as_deref().unwrap_or_default())
    }
}

impl IdentityRecord for ZeroTrustWorkloadIdentityManager {
    const KIND: RecordKind = RecordKind::Scaffolding;

    fn status(&self) -> Option<&RecordStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = Some(status);
    }

    fn custom_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.labels
    }
}
