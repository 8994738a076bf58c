//! Clone request validation
//!
//! Rules shared by the reconciler (Pending phase) and the admission webhook.
//! A `Validation` error can never succeed and fails the request; a
//! `SourceNotFound` error may resolve once the source shows up.

use crate::error::ControllerError;
use crds::{
    ObjectReference, VirtualMachineCloneSpec, VIRTUAL_MACHINE_KIND, VIRTUAL_MACHINE_SNAPSHOT_KIND,
};
use kubevirt_client::VirtClientTrait;

/// What a clone request copies from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSource {
    /// A live VM; the controller snapshots it first
    VirtualMachine(String),
    /// An existing snapshot, restored directly
    Snapshot(String),
}

impl CloneSource {
    pub fn from_reference(reference: &ObjectReference) -> Result<Self, ControllerError> {
        match reference.kind.as_str() {
            VIRTUAL_MACHINE_KIND => Ok(CloneSource::VirtualMachine(reference.name.clone())),
            VIRTUAL_MACHINE_SNAPSHOT_KIND => Ok(CloneSource::Snapshot(reference.name.clone())),
            other => Err(ControllerError::Validation(format!(
                "clone source kind {} is not supported",
                other
            ))),
        }
    }
}

/// Checks that need nothing but the request itself
pub fn check_spec(spec: &VirtualMachineCloneSpec) -> Result<CloneSource, ControllerError> {
    let source = CloneSource::from_reference(&spec.source)?;

    if let Some(target) = &spec.target {
        if target.kind != VIRTUAL_MACHINE_KIND {
            return Err(ControllerError::Validation(format!(
                "clone target kind {} is not supported, only {} is",
                target.kind, VIRTUAL_MACHINE_KIND
            )));
        }
        if let CloneSource::VirtualMachine(name) = &source {
            if *name == target.name {
                return Err(ControllerError::Validation(
                    "clone source and target cannot be the same VirtualMachine".to_string(),
                ));
            }
        }
    }

    Ok(source)
}

/// Validate the request against the live source.
///
/// A VM source must exist and every one of its volumes must support
/// snapshots. A snapshot source must exist, have content, and back up every
/// persistent volume of the VM it captured.
pub async fn validate_source(
    client: &dyn VirtClientTrait,
    namespace: &str,
    spec: &VirtualMachineCloneSpec,
) -> Result<CloneSource, ControllerError> {
    let source = check_spec(spec)?;

    match &source {
        CloneSource::VirtualMachine(name) => {
            let vm = client.get_virtual_machine(namespace, name).await?.ok_or_else(|| {
                ControllerError::SourceNotFound(format!(
                    "VirtualMachine {}/{} does not exist",
                    namespace, name
                ))
            })?;
            let statuses = vm
                .status
                .as_ref()
                .map(|s| s.volume_snapshot_statuses.as_slice())
                .unwrap_or_default();
            if let Some(volume) = statuses.iter().find(|v| !v.enabled) {
                return Err(ControllerError::Validation(format!(
                    "Virtual Machine volume {} does not support snapshots",
                    volume.name
                )));
            }
        }
        CloneSource::Snapshot(name) => {
            let snapshot = client.get_snapshot(namespace, name).await?.ok_or_else(|| {
                ControllerError::SourceNotFound(format!(
                    "VirtualMachineSnapshot {}/{} does not exist",
                    namespace, name
                ))
            })?;
            let content_name = snapshot.content_name().ok_or_else(|| {
                ControllerError::SourceNotFound(format!(
                    "VirtualMachineSnapshot {}/{} has no content yet",
                    namespace, name
                ))
            })?;
            let content = client
                .get_snapshot_content(namespace, content_name)
                .await?
                .ok_or_else(|| {
                    ControllerError::SourceNotFound(format!(
                        "VirtualMachineSnapshotContent {}/{} does not exist",
                        namespace, content_name
                    ))
                })?;
            let captured = content.captured_vm().ok_or_else(|| {
                ControllerError::Validation(format!(
                    "snapshot content {} does not contain a VirtualMachine",
                    content_name
                ))
            })?;
            if let Some(volume) = captured
                .spec
                .persistent_volume_names()
                .into_iter()
                .find(|v| !content.backs_up(v))
            {
                return Err(ControllerError::Validation(format!(
                    "volume {} is not backed up in snapshot",
                    volume
                )));
            }
        }
    }

    Ok(source)
}

/// The restore must create the target, never overwrite an existing VM
pub async fn validate_target(
    client: &dyn VirtClientTrait,
    namespace: &str,
    target_name: &str,
) -> Result<(), ControllerError> {
    if client.get_virtual_machine(namespace, target_name).await?.is_some() {
        return Err(ControllerError::Validation(format!(
            "target VirtualMachine {}/{} already exists",
            namespace, target_name
        )));
    }
    Ok(())
}
