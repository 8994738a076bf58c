//! Status patches for VirtualMachineClone
//!
//! Every status write is a JSON merge patch of the form `{"status": {...}}`.
//! Only the fields set on the builder are sent; clearing a name sends `null`.
//! A patch carrying a resource version is only applied to that version.

use chrono::Utc;
use crds::{
    CloneCondition, ClonePhase, ConditionStatus, CONDITION_PROGRESSING, CONDITION_READY,
};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    fields: Map<String, Value>,
    resource_version: Option<String>,
}

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(mut self, phase: ClonePhase) -> Self {
        self.fields
            .insert("phase".to_string(), Value::String(phase.as_str().to_string()));
        self
    }

    /// Record the snapshot name, or clear it with `None`
    pub fn snapshot_name(mut self, name: Option<&str>) -> Self {
        self.fields.insert("snapshotName".to_string(), optional(name));
        self
    }

    /// Record the restore name, or clear it with `None`
    pub fn restore_name(mut self, name: Option<&str>) -> Self {
        self.fields.insert("restoreName".to_string(), optional(name));
        self
    }

    pub fn target_name(mut self, name: &str) -> Self {
        self.fields
            .insert("targetName".to_string(), Value::String(name.to_string()));
        self
    }

    /// Replace the condition list with `existing` updated by `updates`
    pub fn conditions(mut self, existing: &[CloneCondition], updates: Vec<CloneCondition>) -> Self {
        let merged = merge_conditions(existing, updates);
        self.fields.insert(
            "conditions".to_string(),
            serde_json::to_value(merged).unwrap_or(Value::Array(Vec::new())),
        );
        self
    }

    /// Only apply the patch to this version of the object
    pub fn resource_version(mut self, version: Option<&str>) -> Self {
        self.resource_version = version.map(str::to_string);
        self
    }

    pub fn into_value(self) -> Value {
        match self.resource_version {
            Some(version) => serde_json::json!({
                "metadata": { "resourceVersion": version },
                "status": Value::Object(self.fields),
            }),
            None => serde_json::json!({ "status": Value::Object(self.fields) }),
        }
    }
}

fn optional(name: Option<&str>) -> Value {
    name.map(|n| Value::String(n.to_string())).unwrap_or(Value::Null)
}

/// Merge condition updates into the current list.
///
/// A condition whose status does not change keeps its transition time, so
/// repeating a patch leaves the object untouched.
pub fn merge_conditions(existing: &[CloneCondition], updates: Vec<CloneCondition>) -> Vec<CloneCondition> {
    let mut merged: Vec<CloneCondition> = existing.to_vec();
    for mut update in updates {
        match merged.iter_mut().find(|c| c.type_ == update.type_) {
            Some(current) => {
                if current.status == update.status {
                    update.last_transition_time = current.last_transition_time;
                } else if update.last_transition_time.is_none() {
                    update.last_transition_time = Some(Utc::now());
                }
                *current = update;
            }
            None => merged.push(update),
        }
    }
    merged
}

/// Work is under way
pub fn progressing(reason: &str, message: impl Into<String>) -> Vec<CloneCondition> {
    let message = message.into();
    vec![
        CloneCondition::new(CONDITION_READY, ConditionStatus::False, reason, message.clone()),
        CloneCondition::new(CONDITION_PROGRESSING, ConditionStatus::True, reason, message),
    ]
}

/// Waiting on something outside the controller's control
pub fn blocked(reason: &str, message: impl Into<String>) -> Vec<CloneCondition> {
    let message = message.into();
    vec![
        CloneCondition::new(CONDITION_READY, ConditionStatus::False, reason, message.clone()),
        CloneCondition::new(CONDITION_PROGRESSING, ConditionStatus::False, reason, message),
    ]
}

pub fn succeeded(message: impl Into<String>) -> Vec<CloneCondition> {
    let message = message.into();
    vec![
        CloneCondition::new(CONDITION_READY, ConditionStatus::True, "Succeeded", message.clone()),
        CloneCondition::new(CONDITION_PROGRESSING, ConditionStatus::False, "Succeeded", message),
    ]
}

pub fn failed(reason: &str, message: impl Into<String>) -> Vec<CloneCondition> {
    blocked(reason, message)
}
