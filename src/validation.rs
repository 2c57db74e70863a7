//! # Field Validation
//!
//! Format checks shared by the admission validator and the reconcilers' invariant step,
//! plus issuer normalization.

use crate::constants::DEFAULT_ISSUER_PREFIX;
use crate::crd::IdentityRecord;
use regex::Regex;
use std::sync::LazyLock;

/// SPIFFE trust domain names: lowercase letters, digits, dots, dashes and underscores
static TRUST_DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._-]+$").expect("Failed to compile trust domain regex")
});

/// Host component of an issuer: DNS labels, optional port
static ISSUER_HOST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*(:[0-9]{1,5})?$")
        .expect("Failed to compile issuer host regex")
});

/// Leading URL scheme of an issuer (RFC 3986 `scheme "://"`)
static ISSUER_SCHEME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("Failed to compile issuer scheme regex")
});

const MAX_TRUST_DOMAIN_LEN: usize = 255;

/// Validate a SPIFFE trust domain name
pub fn validate_trust_domain(trust_domain: &str) -> Result<(), String> {
    if trust_domain.is_empty() {
        return Err("trustDomain is required but is empty".to_string());
    }
    if trust_domain.len() > MAX_TRUST_DOMAIN_LEN {
        return Err(format!(
            "trustDomain must be at most {MAX_TRUST_DOMAIN_LEN} characters, got {}",
            trust_domain.len()
        ));
    }
    if !TRUST_DOMAIN_REGEX.is_match(trust_domain) {
        return Err(format!(
            "trustDomain '{trust_domain}' is invalid: only lowercase letters, digits, '.', '-' and '_' are allowed"
        ));
    }
    Ok(())
}

/// Normalize an issuer for comparison
///
/// Strips a leading `scheme://` prefix; an empty result becomes `oidc-discovery.<trustDomain>`.
pub fn normalize_issuer(issuer: &str, trust_domain: &str) -> String {
    let trimmed = issuer.trim();
    let without_scheme = match ISSUER_SCHEME_REGEX.find(trimmed) {
        Some(scheme) => &trimmed[scheme.end()..],
        None => trimmed,
    };
    if without_scheme.is_empty() {
        format!("{DEFAULT_ISSUER_PREFIX}.{trust_domain}")
    } else {
        without_scheme.to_string()
    }
}

/// Host part of a normalized issuer (everything before the first `/`)
pub fn issuer_host(normalized_issuer: &str) -> &str {
    normalized_issuer
        .split('/')
        .next()
        .unwrap_or(normalized_issuer)
}

/// Field-format invariants every record must satisfy before it is reconciled
pub fn check_record_fields<K: IdentityRecord>(record: &K) -> Result<(), String> {
    if let Some(trust_domain) = record.trust_domain() {
        validate_trust_domain(trust_domain)?;
    }
    if let Some(cluster_name) = record.cluster_name() {
        if cluster_name.trim().is_empty() {
            return Err("clusterName is required but is empty".to_string());
        }
    }
    if let Some(issuer) = record.jwt_issuer() {
        let normalized = normalize_issuer(issuer, record.trust_domain().unwrap_or_default());
        let host = issuer_host(&normalized);
        if !ISSUER_HOST_REGEX.is_match(host) {
            return Err(format!(
                "jwtIssuer '{issuer}' is invalid: host '{host}' is not a valid DNS name"
            ));
        }
    }
    Ok(())
}
