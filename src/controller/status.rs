//! # Status Management
//!
//! Buffers the conditions a pass reports and commits them to the record's status
//! sub-resource once, at the end of the pass.
//!
//! Conditions are keyed by type; a later report of the same type within a pass replaces
//! the earlier one. The merged status is written only when it differs from the persisted
//! one: status writes generate watch events, and an unconditional write would retrigger
//! the pass forever.

use crate::cluster::{object_name, ClusterApi};
use crate::crd::{Condition, IdentityRecord, RecordStatus, CONDITION_FALSE, CONDITION_TRUE};
use crate::error::ClusterError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCondition {
    status: bool,
    reason: String,
    message: String,
}

/// Per-pass condition buffer
#[derive(Debug)]
pub struct StatusManager {
    generation: Option<i64>,
    retries: u32,
    pending: BTreeMap<String, PendingCondition>,
}

impl StatusManager {
    pub fn new(generation: Option<i64>, retries: u32) -> Self {
        Self {
            generation,
            retries,
            pending: BTreeMap::new(),
        }
    }

    /// Buffer a condition; the last report of a type within the pass wins
    pub fn add_condition(
        &mut self,
        condition_type: &str,
        reason: &str,
        message: impl Into<String>,
        status: bool,
    ) {
        self.pending.insert(
            condition_type.to_string(),
            PendingCondition {
                status,
                reason: reason.to_string(),
                message: message.into(),
            },
        );
    }

    /// Buffered truth value for a condition type, if the pass reported one
    pub fn pending_status(&self, condition_type: &str) -> Option<bool> {
        self.pending.get(condition_type).map(|p| p.status)
    }

    /// Merge the buffered conditions into `current`
    ///
    /// A persisted condition whose truth value is unchanged is left as it is, reason and
    /// message included. A flipped condition takes the new reason and message and its
    /// `lastTransitionTime` becomes `now`. Conditions the pass did not report are left alone.
    pub fn merge(&self, current: &RecordStatus, now: &str) -> RecordStatus {
        let mut merged = current.clone();
        for (condition_type, pending) in &self.pending {
            let status = if pending.status {
                CONDITION_TRUE
            } else {
                CONDITION_FALSE
            };
            match merged
                .conditions
                .iter_mut()
                .find(|c| &c.r#type == condition_type)
            {
                Some(existing) if existing.status == status => {
                    if existing.last_transition_time.is_none() {
                        existing.last_transition_time = Some(now.to_string());
                    }
                }
                Some(existing) => {
                    existing.status = status.to_string();
                    existing.last_transition_time = Some(now.to_string());
                    existing.reason = Some(pending.reason.clone());
                    existing.message = Some(pending.message.clone());
                }
                None => merged.conditions.push(Condition {
                    r#type: condition_type.clone(),
                    status: status.to_string(),
                    last_transition_time: Some(now.to_string()),
                    reason: Some(pending.reason.clone()),
                    message: Some(pending.message.clone()),
                }),
            }
        }
        if self.generation.is_some() {
            merged.observed_generation = self.generation;
        }
        merged
    }

    /// Commit the buffered conditions to `record`'s status sub-resource
    ///
    /// Returns `Ok(true)` when a write was issued and `Ok(false)` when the merged status
    /// already matched or the record no longer exists. A resourceVersion conflict re-reads
    /// the record and merges again, up to the configured number of retries.
    pub async fn flush<C, K>(&self, cluster: &C, record: &K) -> Result<bool, ClusterError>
    where
        C: ClusterApi,
        K: IdentityRecord,
    {
        let name = object_name(record)?.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let mut current = record.clone();
        let mut attempt = 0;

        loop {
            let persisted = current.status().cloned().unwrap_or_default();
            let merged = self.merge(&persisted, &now);
            if merged == persisted {
                debug!(kind = %K::KIND, name = %name, "Status unchanged, skipping update");
                return Ok(false);
            }

            current.set_status(merged);
            match cluster.replace_status(&current).await {
                Ok(_) => {
                    crate::observability::metrics::increment_status_writes(K::KIND);
                    return Ok(true);
                }
                Err(ClusterError::NotFound { .. }) => {
                    debug!(kind = %K::KIND, name = %name, "Record deleted before status update");
                    return Ok(false);
                }
                Err(e) if e.is_conflict() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        kind = %K::KIND,
                        name = %name,
                        attempt,
                        "Status update conflict, re-reading record"
                    );
                    match cluster.get::<K>(None, &name).await? {
                        Some(fresh) => current = fresh,
                        None => return Ok(false),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
