//! # Record Status
//!
//! Status types shared by every record kind: a set of conditions keyed by type plus the
//! generation the last pass observed.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status value for a condition that holds
pub const CONDITION_TRUE: &str = "True";

/// Condition status value for a condition that does not hold
pub const CONDITION_FALSE: &str = "False";

/// Status sub-resource of every record kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatus {
    /// Conditions represent the latest available observations, at most one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation of the spec the last pass observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl RecordStatus {
    /// Look up the condition of the given type
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// True when the condition of the given type exists and holds
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == CONDITION_TRUE)
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Whether the condition holds
    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }
}
