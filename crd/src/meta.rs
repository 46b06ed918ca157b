use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and bookkeeping shared by every object in the store: custom
/// resources, their children, and lease records alike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: "default".to_string(),
            generation: 1,
            resource_version: String::new(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            creation_timestamp: None,
            deletion_timestamp: None,
            owner_references: Vec::new(),
        }
    }
}

impl ObjectMeta {
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// A one-way back-reference from a child object to the parent that owns
/// it. The store's garbage collector cascades deletes along this edge;
/// no cycles are ever created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default = "default_true")]
    pub controller: bool,
}

fn default_true() -> bool {
    true
}

impl OwnerReference {
    pub fn controller_of(kind: &str, name: &str, uid: &str) -> Self {
        Self {
            api_version: "serving.ai/v1alpha1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            controller: true,
        }
    }
}

/// A single long-lived condition entry. Every status block in this
/// system (`LLMCluster`, `LLMClusterAutoscaler`) uses this same shape
/// rather than a bespoke per-kind condition struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Upsert a condition by type, updating `last_transition_time` only when
/// the status actually changes.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        if existing.status != new.status {
            existing.status = new.status;
            existing.last_transition_time = new.last_transition_time;
        }
        existing.reason = new.reason;
        existing.message = new.message;
    } else {
        conditions.push(new);
    }
}
