//! VirtualMachineRestore projection
//!
//! Typed view of the `snapshot.kubevirt.io/v1beta1` `VirtualMachineRestore` kind.
//! A restore materializes `target` from a snapshot, applying `patches`
//! (serialized RFC 6902 operations) to the VM captured in the snapshot content.

use crate::references::ObjectReference;
use crate::virtual_machine::ExtraFields;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "snapshot.kubevirt.io",
    version = "v1beta1",
    kind = "VirtualMachineRestore",
    namespaced,
    status = "VirtualMachineRestoreStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineRestoreSpec {
    /// VM to create (or overwrite) from the snapshot
    pub target: ObjectReference,

    /// Snapshot to restore from
    pub virtual_machine_snapshot_name: String,

    /// JSON patch operations applied to the captured VM, one per entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineRestoreStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,

    /// Volumes materialized by the restore
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restores: Vec<VolumeRestore>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRestore {
    pub volume_name: String,

    /// Name of the PVC created for the target VM
    #[serde(rename = "persistentVolumeClaim")]
    pub persistent_volume_claim_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_volume_name: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VirtualMachineRestore {
    /// Whether the restore engine finished materializing the target
    pub fn is_complete(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.complete)
            .unwrap_or(false)
    }

    /// Names of the PVCs the restore created for the target VM
    pub fn restored_claim_names(&self) -> Vec<&str> {
        self.status
            .as_ref()
            .map(|s| {
                s.restores
                    .iter()
                    .map(|r| r.persistent_volume_claim_name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
