//! VirtualMachine projection
//!
//! Typed view of the `kubevirt.io/v1` `VirtualMachine` kind. Only the fields the
//! clone controller reads or rewrites are modelled; everything else is kept in
//! flattened `extra` maps so a VM round-trips through these types without loss.
//! The schema of this kind is owned by KubeVirt, so no schema is generated here.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields that are not modelled explicitly but must survive a round trip.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    namespaced,
    status = "VirtualMachineStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Run strategy (Always, Halted, Manual, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_strategy: Option<String>,

    /// Instance type binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instancetype: Option<ResourceMatcher>,

    /// Preference binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<ResourceMatcher>,

    /// DataVolumes created together with the VM
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_volume_templates: Vec<DataVolumeTemplate>,

    /// Instance template
    #[serde(default)]
    pub template: VirtualMachineInstanceTemplate,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Instance type or preference matcher.
///
/// `revisionName` points at the ControllerRevision holding the versioned
/// copy of the instance type or preference the VM is bound to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeTemplate {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineInstanceTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,

    #[serde(default)]
    pub spec: VirtualMachineInstanceSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    #[serde(default)]
    pub domain: DomainSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default)]
    pub devices: Devices,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<Firmware>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Guest network interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,

    /// Fixed MAC address; absent means the runtime assigns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Firmware identity exposed to the guest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    /// Firmware UUID (SMBIOS system UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// SMBIOS serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_volume: Option<DataVolumeSource>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVolumeSource {
    pub claim_name: String,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeSource {
    pub name: String,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// Human readable status (Stopped, Running, Provisioning, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printable_status: Option<String>,

    /// Per-volume snapshot capability as reported by KubeVirt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_snapshot_statuses: Vec<VolumeSnapshotStatus>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshotStatus {
    pub name: String,

    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VirtualMachineSpec {
    /// Names of volumes backed by a PVC or a DataVolume.
    ///
    /// These are the volumes a snapshot has to capture for a restore to
    /// reproduce the VM's storage.
    pub fn persistent_volume_names(&self) -> Vec<&str> {
        self.template
            .spec
            .volumes
            .iter()
            .filter(|v| v.persistent_volume_claim.is_some() || v.data_volume.is_some())
            .map(|v| v.name.as_str())
            .collect()
    }

    /// Interfaces declared on the instance template
    pub fn interfaces(&self) -> &[Interface] {
        &self.template.spec.domain.devices.interfaces
    }

    /// Firmware block of the instance template, if any
    pub fn firmware(&self) -> Option<&Firmware> {
        self.template.spec.domain.firmware.as_ref()
    }
}
