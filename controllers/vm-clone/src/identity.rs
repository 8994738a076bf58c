//! Identity rewriter
//!
//! Produces the target VM of a clone from the VM captured in the snapshot:
//! filtered metadata, overridden MAC addresses and serial, a fresh firmware
//! UUID and instance type / preference bindings pointing at copied revisions.
//! The result is expressed as JSON Patch operations against the captured VM,
//! which is what the restore engine consumes.

use crate::filter::copy_metadata;
use crds::{CapturedVirtualMachine, VirtualMachineCloneSpec, VirtualMachineSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Per-clone inputs of the spec rewrite
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    /// Replacement MAC addresses keyed by interface name
    pub mac_addresses: Option<&'a BTreeMap<String, String>>,
    /// Replacement SMBIOS serial
    pub serial: Option<&'a str>,
    /// Firmware UUID for the target, see `firmware_uuid`
    pub firmware_uuid: String,
    /// Name of the copied instance type revision
    pub instancetype_revision: Option<String>,
    /// Name of the copied preference revision
    pub preference_revision: Option<String>,
}

/// Deterministic firmware UUID for a clone target.
///
/// Derived from the clone UID and the target name so retries of the same clone
/// produce the same value while distinct clones never share one.
pub fn firmware_uuid(clone_uid: &str, target_name: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}/{}", clone_uid, target_name).as_bytes(),
    )
    .to_string()
}

/// Rewrite the hardware identity of `source`, copying everything else verbatim
pub fn rewrite_spec(source: &VirtualMachineSpec, overrides: &Overrides<'_>) -> VirtualMachineSpec {
    let mut target = source.clone();

    for interface in &mut target.template.spec.domain.devices.interfaces {
        match overrides
            .mac_addresses
            .and_then(|macs| macs.get(&interface.name))
        {
            Some(mac) => interface.mac_address = Some(mac.clone()),
            None => {
                if let Some(mac) = &interface.mac_address {
                    warn!(
                        interface = %interface.name,
                        mac = %mac,
                        "Cloning fixed MAC address without override; source and target will share it"
                    );
                }
            }
        }
    }

    if let Some(firmware) = target.template.spec.domain.firmware.as_mut() {
        if firmware.uuid.is_some() {
            firmware.uuid = Some(overrides.firmware_uuid.clone());
        }
    }

    if let Some(serial) = overrides.serial {
        target
            .template
            .spec
            .domain
            .firmware
            .get_or_insert_with(Default::default)
            .serial = Some(serial.to_string());
    }

    // Source and target must never share a revision
    if let Some(matcher) = target.instancetype.as_mut() {
        if matcher.revision_name.is_some() {
            matcher.revision_name = overrides.instancetype_revision.clone();
        }
    }
    if let Some(matcher) = target.preference.as_mut() {
        if matcher.revision_name.is_some() {
            matcher.revision_name = overrides.preference_revision.clone();
        }
    }

    target
}

/// Build the complete target VM: filtered metadata plus the rewritten spec
pub fn build_target(
    source: &CapturedVirtualMachine,
    clone: &VirtualMachineCloneSpec,
    target_name: &str,
    overrides: &Overrides<'_>,
) -> CapturedVirtualMachine {
    let mut spec = rewrite_spec(&source.spec, overrides);

    if let Some(template_meta) = spec.template.metadata.as_mut() {
        template_meta.labels = copy_metadata(
            template_meta.labels.as_ref(),
            &clone.template.label_filters,
        );
        template_meta.annotations = copy_metadata(
            template_meta.annotations.as_ref(),
            &clone.template.annotation_filters,
        );
    }

    CapturedVirtualMachine {
        metadata: ObjectMeta {
            name: Some(target_name.to_string()),
            labels: copy_metadata(source.metadata.labels.as_ref(), &clone.label_filters),
            annotations: copy_metadata(
                source.metadata.annotations.as_ref(),
                &clone.annotation_filters,
            ),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Metadata the restore engine takes from a VM document.
///
/// The name is absent: the engine names the new VM after the restore target.
fn restorable_view(vm: &CapturedVirtualMachine) -> CapturedVirtualMachine {
    CapturedVirtualMachine {
        metadata: ObjectMeta {
            labels: vm.metadata.labels.clone(),
            annotations: vm.metadata.annotations.clone(),
            ..Default::default()
        },
        spec: vm.spec.clone(),
        status: None,
    }
}

/// JSON Patch operations turning `source` into `target`, one serialized operation per entry
pub fn restore_patches(
    source: &CapturedVirtualMachine,
    target: &CapturedVirtualMachine,
) -> Result<Vec<String>, serde_json::Error> {
    let from = serde_json::to_value(restorable_view(source))?;
    let to = serde_json::to_value(restorable_view(target))?;
    json_patch::diff(&from, &to)
        .0
        .iter()
        .map(serde_json::to_string)
        .collect()
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod identity_test;
