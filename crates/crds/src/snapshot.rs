//! VirtualMachineSnapshot and VirtualMachineSnapshotContent projections
//!
//! Typed view of the `snapshot.kubevirt.io/v1beta1` snapshot kinds. The clone
//! controller creates snapshots, polls their readiness and reads the captured
//! VM and volume backups from the snapshot content.

use crate::references::ObjectReference;
use crate::virtual_machine::{ExtraFields, VirtualMachineSpec, VirtualMachineStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "snapshot.kubevirt.io",
    version = "v1beta1",
    kind = "VirtualMachineSnapshot",
    namespaced,
    status = "VirtualMachineSnapshotStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotSpec {
    /// The VM being snapshotted
    pub source: ObjectReference,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_snapshot_content_name: Option<String>,

    /// InProgress, Succeeded, Failed, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Snapshot phase reported when the snapshot engine gave up
pub const SNAPSHOT_PHASE_FAILED: &str = "Failed";

impl VirtualMachineSnapshot {
    /// Whether the snapshot engine reports the snapshot as usable
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.ready_to_use)
            .unwrap_or(false)
    }

    /// Name of the content object, once the snapshot engine created it
    pub fn content_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.virtual_machine_snapshot_content_name.as_deref())
    }

    /// Failure message when the snapshot ended in the Failed phase
    pub fn failure(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        if status.phase.as_deref() != Some(SNAPSHOT_PHASE_FAILED) {
            return None;
        }
        Some(
            status
                .error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| "snapshot failed".to_string()),
        )
    }
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "snapshot.kubevirt.io",
    version = "v1beta1",
    kind = "VirtualMachineSnapshotContent",
    namespaced,
    status = "VirtualMachineSnapshotContentStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotContentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_snapshot_name: Option<String>,

    #[serde(default)]
    pub source: SnapshotContentSource,

    /// Volumes captured by the snapshot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_backups: Vec<VolumeBackup>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotContentSource {
    /// VM as it was when the snapshot was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine: Option<CapturedVirtualMachine>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Copy of a VM stored inside a snapshot content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedVirtualMachine {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: VirtualMachineSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VirtualMachineStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBackup {
    pub volume_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_name: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotContentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VirtualMachineSnapshotContent {
    /// The VM captured by this content, if the snapshot engine recorded one
    pub fn captured_vm(&self) -> Option<&CapturedVirtualMachine> {
        self.spec.source.virtual_machine.as_ref()
    }

    /// Whether a backup exists for the named VM volume
    pub fn backs_up(&self, volume_name: &str) -> bool {
        self.spec
            .volume_backups
            .iter()
            .any(|b| b.volume_name == volume_name)
    }
}
