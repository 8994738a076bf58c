//! VirtualMachineClone CRD
//!
//! Requests an independent copy of a virtual machine, or of a point-in-time
//! snapshot of one. The clone controller drives the request through its
//! phases by creating a snapshot and a restore on the user's behalf.

use crate::references::ObjectReference;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "clone.kubevirt.io",
    version = "v1beta1",
    kind = "VirtualMachineClone",
    plural = "virtualmachineclones",
    shortname = "vmclone",
    namespaced,
    status = "VirtualMachineCloneStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"SourceVirtualMachine","type":"string","jsonPath":".spec.source.name"}"#,
    printcolumn = r#"{"name":"TargetVirtualMachine","type":"string","jsonPath":".status.targetName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCloneSpec {
    /// VirtualMachine or VirtualMachineSnapshot to clone from
    pub source: ObjectReference,

    /// VirtualMachine to create; a name is generated when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectReference>,

    /// Ordered glob patterns selecting which labels are copied ("!" negates)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_filters: Vec<String>,

    /// Ordered glob patterns selecting which annotations are copied ("!" negates)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotation_filters: Vec<String>,

    /// Filters applied to the instance template metadata
    #[serde(default)]
    pub template: TemplateFilters,

    /// Replacement MAC addresses keyed by interface name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_mac_addresses: BTreeMap<String, String>,

    /// Replacement SMBIOS serial
    #[serde(
        default,
        rename = "newSMBiosSerial",
        skip_serializing_if = "Option::is_none"
    )]
    pub new_sm_bios_serial: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_filters: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotation_filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCloneStatus {
    /// Current phase
    #[serde(default)]
    pub phase: ClonePhase,

    /// Snapshot created by the controller (absent for snapshot sources and after cleanup)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,

    /// Restore created by the controller (absent after cleanup)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_name: Option<String>,

    /// Resolved target VM name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CloneCondition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Clone phase
///
/// Phases only move forward:
/// Pending -> SnapshotInProgress -> RestoreInProgress -> Succeeded | Failed.
/// An empty string is accepted for a request the controller has not seen yet.
pub enum ClonePhase {
    /// Not yet observed by the controller
    #[default]
    #[serde(rename = "")]
    Unset,

    /// Source is being validated
    Pending,

    /// Controller-created snapshot is being taken
    SnapshotInProgress,

    /// Restore into the target VM is running
    RestoreInProgress,

    /// Target VM exists
    Succeeded,

    /// Clone failed permanently
    Failed,
}

impl ClonePhase {
    /// The literal wire value of the phase
    pub fn as_str(self) -> &'static str {
        match self {
            ClonePhase::Unset => "",
            ClonePhase::Pending => "Pending",
            ClonePhase::SnapshotInProgress => "SnapshotInProgress",
            ClonePhase::RestoreInProgress => "RestoreInProgress",
            ClonePhase::Succeeded => "Succeeded",
            ClonePhase::Failed => "Failed",
        }
    }

    /// Position along the only allowed path through the phases
    fn rank(self) -> u8 {
        match self {
            ClonePhase::Unset => 0,
            ClonePhase::Pending => 1,
            ClonePhase::SnapshotInProgress => 2,
            ClonePhase::RestoreInProgress => 3,
            ClonePhase::Succeeded | ClonePhase::Failed => 4,
        }
    }

    /// Whether no further phase change is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ClonePhase::Succeeded | ClonePhase::Failed)
    }

    /// Whether moving from `self` to `next` keeps phases monotonic
    pub fn can_transition_to(self, next: ClonePhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for ClonePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClonePhase::Unset => f.write_str("Unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Condition types reported on a clone
pub const CONDITION_READY: &str = "Ready";
/// Condition types reported on a clone
pub const CONDITION_PROGRESSING: &str = "Progressing";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloneCondition {
    /// Type of condition (Ready, Progressing)
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl CloneCondition {
    /// Create a new condition stamped with the current time
    pub fn new(
        type_: &str,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl VirtualMachineClone {
    /// Current phase; unset when the controller has not written status yet
    pub fn phase(&self) -> ClonePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&CloneCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == type_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_wire_values() {
        assert_eq!(serde_json::to_value(ClonePhase::Unset).unwrap(), "");
        assert_eq!(
            serde_json::to_value(ClonePhase::SnapshotInProgress).unwrap(),
            "SnapshotInProgress"
        );
        let unset: ClonePhase = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(unset, ClonePhase::Unset);
        let succeeded: ClonePhase = serde_json::from_str(r#""Succeeded""#).unwrap();
        assert_eq!(succeeded, ClonePhase::Succeeded);
    }

    #[test]
    fn test_phase_transitions_are_monotonic() {
        assert!(ClonePhase::Unset.can_transition_to(ClonePhase::Pending));
        assert!(ClonePhase::Pending.can_transition_to(ClonePhase::RestoreInProgress));
        assert!(ClonePhase::RestoreInProgress.can_transition_to(ClonePhase::Succeeded));
        assert!(!ClonePhase::RestoreInProgress.can_transition_to(ClonePhase::SnapshotInProgress));
        assert!(!ClonePhase::Succeeded.can_transition_to(ClonePhase::Failed));
        assert!(!ClonePhase::Failed.can_transition_to(ClonePhase::Pending));
    }

    #[test]
    fn test_spec_wire_format() {
        let clone: VirtualMachineClone = serde_json::from_value(serde_json::json!({
            "apiVersion": "clone.kubevirt.io/v1beta1",
            "kind": "VirtualMachineClone",
            "metadata": {"name": "testclone", "namespace": "default"},
            "spec": {
                "source": {"apiGroup": "kubevirt.io", "kind": "VirtualMachine", "name": "vm-a"},
                "target": {"apiGroup": "kubevirt.io", "kind": "VirtualMachine", "name": "vm-b"},
                "labelFilters": ["*", "!key2"],
                "template": {"annotationFilters": ["key1"]},
                "newMacAddresses": {"eth0": "BE-AD-00-00-BE-04"},
                "newSMBiosSerial": "target-serial"
            }
        }))
        .unwrap();
        assert_eq!(clone.spec.label_filters, vec!["*", "!key2"]);
        assert_eq!(clone.spec.template.annotation_filters, vec!["key1"]);
        assert_eq!(clone.spec.new_sm_bios_serial.as_deref(), Some("target-serial"));
        assert_eq!(clone.phase(), ClonePhase::Unset);
    }
}
