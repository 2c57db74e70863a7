//! # Cross-Record Validator
//!
//! Admission-time invariants across the SpireServer, SpireAgent and
//! SpireOidcDiscoveryProvider records:
//!
//! - `trustDomain` agrees across every record that exists
//! - `clusterName` agrees between the server and the agent
//! - the normalized issuer agrees between the server and the discovery provider
//! - `trustDomain` and `clusterName` never change on update
//!
//! A missing sibling is never a violation. The validator only reads.

use crate::cluster::ClusterApi;
use crate::constants::SINGLETON_NAME;
use crate::crd::{IdentityRecord, RecordKind, SpireAgent, SpireOidcDiscoveryProvider, SpireServer};
use crate::error::ClusterError;
use crate::validation::{check_record_fields, normalize_issuer};
use async_trait::async_trait;
use thiserror::Error;

/// Why a submission was denied; the display string is returned to the submitter
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("{kind} must be named \"cluster\", got \"{name}\"")]
    InvalidName { kind: RecordKind, name: String },

    #[error("{0}")]
    InvalidField(String),

    #[error("{field} is immutable: cannot change from \"{old}\" to \"{new}\"")]
    Immutable {
        field: &'static str,
        old: String,
        new: String,
    },

    #[error("{field} \"{value}\" does not match {sibling} \"cluster\" {field} \"{sibling_value}\"")]
    SiblingMismatch {
        field: &'static str,
        value: String,
        sibling: RecordKind,
        sibling_value: String,
    },

    #[error("failed to look up related records: {0}")]
    Lookup(#[source] ClusterError),

    #[error("admission request carries no object")]
    MissingObject,
}

/// Read-only access to the persisted sibling records
#[async_trait]
pub trait SiblingLookup: Send + Sync {
    async fn server(&self) -> Result<Option<SpireServer>, ClusterError>;

    async fn agent(&self) -> Result<Option<SpireAgent>, ClusterError>;

    async fn discovery_provider(&self) -> Result<Option<SpireOidcDiscoveryProvider>, ClusterError>;
}

#[async_trait]
impl<C: ClusterApi> SiblingLookup for C {
    async fn server(&self) -> Result<Option<SpireServer>, ClusterError> {
        self.get(None, SINGLETON_NAME).await
    }

    async fn agent(&self) -> Result<Option<SpireAgent>, ClusterError> {
        self.get(None, SINGLETON_NAME).await
    }

    async fn discovery_provider(&self) -> Result<Option<SpireOidcDiscoveryProvider>, ClusterError> {
        self.get(None, SINGLETON_NAME).await
    }
}

/// The fields cross-checked between records
#[derive(Debug, Clone)]
struct Facts {
    kind: RecordKind,
    trust_domain: Option<String>,
    cluster_name: Option<String>,
    issuer: Option<String>,
}

impl Facts {
    fn of<K: IdentityRecord>(record: &K) -> Self {
        let trust_domain = record.trust_domain().map(str::to_string);
        let issuer = record
            .jwt_issuer()
            .map(|raw| normalize_issuer(raw, trust_domain.as_deref().unwrap_or_default()));
        Self {
            kind: K::KIND,
            trust_domain,
            cluster_name: record.cluster_name().map(str::to_string),
            issuer,
        }
    }
}

/// Compare one field against every sibling that declares it
fn mismatches(
    field: &'static str,
    own: Option<&str>,
    siblings: &[Facts],
    pick: fn(&Facts) -> Option<&str>,
) -> Vec<Rejection> {
    let Some(value) = own else {
        return Vec::new();
    };
    siblings
        .iter()
        .filter_map(|sibling| {
            let sibling_value = pick(sibling)?;
            (sibling_value != value).then(|| Rejection::SiblingMismatch {
                field,
                value: value.to_string(),
                sibling: sibling.kind,
                sibling_value: sibling_value.to_string(),
            })
        })
        .collect()
}

fn immutable(field: &'static str, old: Option<&str>, new: Option<&str>) -> Result<(), Rejection> {
    match (old, new) {
        (Some(old), Some(new)) if old != new => Err(Rejection::Immutable {
            field,
            old: old.to_string(),
            new: new.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Admission validator over a sibling lookup
#[derive(Debug, Clone)]
pub struct Validator<L> {
    lookup: L,
}

impl<L: SiblingLookup> Validator<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    pub async fn validate_create<K: IdentityRecord>(&self, new: &K) -> Result<(), Rejection> {
        let name = new.meta().name.clone().unwrap_or_default();
        if name != SINGLETON_NAME {
            return Err(Rejection::InvalidName { kind: K::KIND, name });
        }
        check_record_fields(new).map_err(Rejection::InvalidField)?;

        let own = Facts::of(new);
        let siblings = self.siblings(K::KIND).await?;

        let mut violations = mismatches("trustDomain", own.trust_domain.as_deref(), &siblings, |s| {
            s.trust_domain.as_deref()
        });
        violations.extend(mismatches(
            "clusterName",
            own.cluster_name.as_deref(),
            &siblings,
            |s| s.cluster_name.as_deref(),
        ));
        violations.extend(mismatches("jwtIssuer", own.issuer.as_deref(), &siblings, |s| {
            s.issuer.as_deref()
        }));

        match violations.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    /// Immutability is checked first and does not depend on any sibling
    pub async fn validate_update<K: IdentityRecord>(&self, old: &K, new: &K) -> Result<(), Rejection> {
        immutable("trustDomain", old.trust_domain(), new.trust_domain())?;
        immutable("clusterName", old.cluster_name(), new.cluster_name())?;
        self.validate_create(new).await
    }

    /// Persisted primary records other than `except`; a failed lookup denies
    async fn siblings(&self, except: RecordKind) -> Result<Vec<Facts>, Rejection> {
        let mut facts = Vec::new();
        if except != RecordKind::Server {
            if let Some(server) = self.lookup.server().await.map_err(Rejection::Lookup)? {
                facts.push(Facts::of(&server));
            }
        }
        if except != RecordKind::Agent {
            if let Some(agent) = self.lookup.agent().await.map_err(Rejection::Lookup)? {
                facts.push(Facts::of(&agent));
            }
        }
        if except != RecordKind::DiscoveryProvider {
            if let Some(provider) = self
                .lookup
                .discovery_provider()
                .await
                .map_err(Rejection::Lookup)?
            {
                facts.push(Facts::of(&provider));
            }
        }
        Ok(facts)
    }
}
