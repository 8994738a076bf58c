//! Dependent-resource lifecycle manager
//!
//! Creates, observes and deletes the snapshot, restore and controller revision
//! objects a clone request needs. Dependent names are derived from the clone
//! UID, so a create that finds the object already present is a success: the
//! previous attempt got that far before the status write was lost.

use crate::error::ControllerError;
use crds::{
    ObjectReference, VirtualMachine, VirtualMachineClone, VirtualMachineRestore,
    VirtualMachineRestoreSpec, VirtualMachineSnapshot, VirtualMachineSnapshotSpec,
};
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use kubevirt_client::{VirtClientTrait, VirtError};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Label carried by every dependent created for a clone request
pub const CLONE_NAME_LABEL: &str = "clone.kubevirt.io/clone-name";

const BOUND_PHASE: &str = "Bound";
const WAIT_FOR_FIRST_CONSUMER: &str = "WaitForFirstConsumer";

/// Kind of binding a copied controller revision belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionKind {
    Instancetype,
    Preference,
}

impl RevisionKind {
    fn as_str(self) -> &'static str {
        match self {
            RevisionKind::Instancetype => "instancetype",
            RevisionKind::Preference => "preference",
        }
    }
}

/// UID of the clone request, falling back to its name before the API server assigned one
pub fn clone_uid(clone: &VirtualMachineClone) -> String {
    clone
        .metadata
        .uid
        .clone()
        .or_else(|| clone.metadata.name.clone())
        .unwrap_or_default()
}

fn short_uid(uid: &str) -> &str {
    uid.get(..8).unwrap_or(uid)
}

/// Name of the snapshot the controller takes of a VM source
pub fn snapshot_name(uid: &str) -> String {
    format!("tmp-snapshot-{}", uid)
}

/// Name of the restore that materializes the target
pub fn restore_name(uid: &str) -> String {
    format!("restore-{}", uid)
}

/// Name of a target's private copy of an instance type or preference revision
pub fn revision_name(target_name: &str, kind: RevisionKind, uid: &str) -> String {
    format!("{}-{}-{}", target_name, kind.as_str(), short_uid(uid))
}

/// Target VM name used when the request does not name one
pub fn default_target_name(uid: &str) -> String {
    format!("clone-{}", short_uid(uid))
}

/// Owner reference pointing at the clone request.
///
/// Deleting the request never blocks on its dependents; garbage collection
/// removes whatever cleanup did not get to.
pub fn owner_reference(clone: &VirtualMachineClone) -> OwnerReference {
    OwnerReference {
        api_version: VirtualMachineClone::api_version(&()).to_string(),
        kind: VirtualMachineClone::kind(&()).to_string(),
        name: clone.metadata.name.clone().unwrap_or_default(),
        uid: clone.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(false),
    }
}

/// Owner reference pointing at a target VM, or `None` before it has a UID
pub fn vm_owner_reference(vm: &VirtualMachine) -> Option<OwnerReference> {
    Some(OwnerReference {
        api_version: VirtualMachine::api_version(&()).to_string(),
        kind: VirtualMachine::kind(&()).to_string(),
        name: vm.metadata.name.clone()?,
        uid: vm.metadata.uid.clone()?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

fn dependent_metadata(clone: &VirtualMachineClone, name: String, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            CLONE_NAME_LABEL.to_string(),
            clone.metadata.name.clone().unwrap_or_default(),
        )])),
        owner_references: Some(vec![owner_reference(clone)]),
        ..Default::default()
    }
}

/// Treat AlreadyExists as success for idempotent creates
fn tolerate_existing<T>(result: Result<T, VirtError>, what: &str) -> Result<(), ControllerError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => {
            debug!("{} already exists, adopting it", what);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Take a snapshot of the source VM. Returns the snapshot name.
pub async fn create_snapshot(
    client: &dyn VirtClientTrait,
    clone: &VirtualMachineClone,
    namespace: &str,
    vm_name: &str,
) -> Result<String, ControllerError> {
    let name = snapshot_name(&clone_uid(clone));
    let snapshot = VirtualMachineSnapshot {
        metadata: dependent_metadata(clone, name.clone(), namespace),
        spec: VirtualMachineSnapshotSpec {
            source: ObjectReference::virtual_machine(vm_name),
            extra: Default::default(),
        },
        status: None,
    };
    tolerate_existing(
        client.create_snapshot(namespace, &snapshot).await,
        &format!("VirtualMachineSnapshot {}/{}", namespace, name),
    )?;
    info!(snapshot = %name, vm = %vm_name, "Created snapshot of source VM");
    Ok(name)
}

/// Restore `snapshot` into `target_name`, rewriting it with `patches`. Returns the restore name.
pub async fn create_restore(
    client: &dyn VirtClientTrait,
    clone: &VirtualMachineClone,
    namespace: &str,
    snapshot: &str,
    target_name: &str,
    patches: Vec<String>,
) -> Result<String, ControllerError> {
    let name = restore_name(&clone_uid(clone));
    let restore = VirtualMachineRestore {
        metadata: dependent_metadata(clone, name.clone(), namespace),
        spec: VirtualMachineRestoreSpec {
            target: ObjectReference::virtual_machine(target_name),
            virtual_machine_snapshot_name: snapshot.to_string(),
            patches,
            extra: Default::default(),
        },
        status: None,
    };
    tolerate_existing(
        client.create_restore(namespace, &restore).await,
        &format!("VirtualMachineRestore {}/{}", namespace, name),
    )?;
    info!(restore = %name, snapshot = %snapshot, target = %target_name, "Created restore");
    Ok(name)
}

/// Copy controller revision `source` under the name `target`.
///
/// The copy carries identical data; only its identity differs. It is owned
/// by the clone request until `adopt_revisions` hands it to the target. A
/// missing source revision cannot be recovered from and fails the clone.
pub async fn copy_revision(
    client: &dyn VirtClientTrait,
    clone: &VirtualMachineClone,
    namespace: &str,
    source: &str,
    target: &str,
) -> Result<(), ControllerError> {
    let original = client
        .get_controller_revision(namespace, source)
        .await?
        .ok_or_else(|| {
            ControllerError::ResourceGone(format!(
                "controller revision {}/{} does not exist",
                namespace, source
            ))
        })?;

    let mut metadata = ObjectMeta {
        name: Some(target.to_string()),
        namespace: Some(namespace.to_string()),
        labels: original.metadata.labels.clone(),
        owner_references: Some(vec![owner_reference(clone)]),
        ..Default::default()
    };
    metadata.labels.get_or_insert_with(BTreeMap::new).insert(
        CLONE_NAME_LABEL.to_string(),
        clone.metadata.name.clone().unwrap_or_default(),
    );
    let copy = ControllerRevision {
        metadata,
        data: original.data.clone(),
        revision: original.revision,
    };
    tolerate_existing(
        client.create_controller_revision(namespace, &copy).await,
        &format!("ControllerRevision {}/{}", namespace, target),
    )?;
    info!(source = %source, copy = %target, "Copied controller revision");
    Ok(())
}

/// Make the target VM the owner of the revision copies it is bound to.
///
/// Only copies made for this request are touched, so a binding the restore
/// left pointing elsewhere keeps its owner.
pub async fn adopt_revisions(
    client: &dyn VirtClientTrait,
    clone: &VirtualMachineClone,
    namespace: &str,
    target_name: &str,
) -> Result<(), ControllerError> {
    let Some(vm) = client.get_virtual_machine(namespace, target_name).await? else {
        warn!(target = %target_name, "Target VirtualMachine not found, leaving revision copies with the clone");
        return Ok(());
    };
    let Some(owner) = vm_owner_reference(&vm) else {
        warn!(target = %target_name, "Target VirtualMachine has no UID yet, leaving revision copies with the clone");
        return Ok(());
    };

    let uid = clone_uid(clone);
    let bindings = [
        (vm.spec.instancetype.as_ref(), RevisionKind::Instancetype),
        (vm.spec.preference.as_ref(), RevisionKind::Preference),
    ];
    for (matcher, kind) in bindings {
        let copy = revision_name(target_name, kind, &uid);
        if matcher.and_then(|m| m.revision_name.as_deref()) != Some(copy.as_str()) {
            continue;
        }
        match client.set_controller_revision_owner(namespace, &copy, &owner).await {
            Ok(()) => debug!(revision = %copy, target = %target_name, "Revision copy adopted by target"),
            Err(VirtError::NotFound(_)) => warn!(revision = %copy, "Revision copy disappeared before adoption"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Observed state of a controller-created snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotState {
    Missing,
    Failed(String),
    InProgress,
    /// Ready to use, with the name of its content object
    Ready(String),
}

/// Look up a snapshot and classify its progress
pub async fn snapshot_state(
    client: &dyn VirtClientTrait,
    namespace: &str,
    name: &str,
) -> Result<SnapshotState, ControllerError> {
    let Some(snapshot) = client.get_snapshot(namespace, name).await? else {
        return Ok(SnapshotState::Missing);
    };
    if let Some(message) = snapshot.failure() {
        return Ok(SnapshotState::Failed(message));
    }
    match (snapshot.is_ready(), snapshot.content_name()) {
        (true, Some(content)) => Ok(SnapshotState::Ready(content.to_string())),
        _ => Ok(SnapshotState::InProgress),
    }
}

/// Observed state of a restore
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreState {
    Missing,
    InProgress,
    Complete,
}

/// Look up a restore and report whether it finished
pub async fn restore_state(
    client: &dyn VirtClientTrait,
    namespace: &str,
    name: &str,
) -> Result<RestoreState, ControllerError> {
    Ok(match client.get_restore(namespace, name).await? {
        None => RestoreState::Missing,
        Some(restore) if restore.is_complete() => RestoreState::Complete,
        Some(_) => RestoreState::InProgress,
    })
}

/// Whether the restored volumes allow the dependents to be deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupGate {
    Ready,
    /// Deletion must wait; the string says which volume is holding it back
    Deferred(String),
}

/// Check every PVC the restore created.
///
/// A PVC still waiting for its first consumer needs the restore's data source
/// to stay around until it binds. An unbound PVC on an immediate-binding class
/// is not going to be held back by the target, so it does not block cleanup.
pub async fn cleanup_gate(
    client: &dyn VirtClientTrait,
    namespace: &str,
    restore: &VirtualMachineRestore,
) -> Result<CleanupGate, ControllerError> {
    for claim_name in restore.restored_claim_names() {
        let Some(claim) = client.get_persistent_volume_claim(namespace, claim_name).await? else {
            return Ok(CleanupGate::Deferred(format!(
                "PersistentVolumeClaim {} has not been created yet",
                claim_name
            )));
        };

        let phase = claim.status.as_ref().and_then(|s| s.phase.as_deref());
        if phase == Some(BOUND_PHASE) {
            continue;
        }

        let class_name = claim.spec.as_ref().and_then(|s| s.storage_class_name.as_deref());
        let Some(class_name) = class_name else {
            continue;
        };
        let binding_mode = client
            .get_storage_class(class_name)
            .await?
            .and_then(|class| class.volume_binding_mode);
        if binding_mode.as_deref() == Some(WAIT_FOR_FIRST_CONSUMER) {
            return Ok(CleanupGate::Deferred(format!(
                "PersistentVolumeClaim {} is waiting for its first consumer",
                claim_name
            )));
        }
    }
    Ok(CleanupGate::Ready)
}

/// Result of a cleanup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Every controller-created dependent is gone
    Done,
    Deferred(String),
}

/// Delete the restore and the snapshot the controller created.
///
/// Only names recorded in status are touched, so a user-supplied source
/// snapshot is never deleted. Failures surface as `ControllerError::Cleanup`.
pub async fn cleanup(
    client: &dyn VirtClientTrait,
    namespace: &str,
    snapshot: Option<&str>,
    restore: Option<&str>,
) -> Result<CleanupOutcome, ControllerError> {
    if let Some(restore_name) = restore {
        let existing = client
            .get_restore(namespace, restore_name)
            .await
            .map_err(|e| ControllerError::Cleanup(e.to_string()))?;
        if let Some(existing) = existing {
            if let CleanupGate::Deferred(reason) = cleanup_gate(client, namespace, &existing).await? {
                return Ok(CleanupOutcome::Deferred(reason));
            }
        }
        client
            .delete_restore(namespace, restore_name)
            .await
            .map_err(|e| ControllerError::Cleanup(format!("restore {}: {}", restore_name, e)))?;
        debug!(restore = %restore_name, "Deleted restore");
    }

    if let Some(snapshot_name) = snapshot {
        client
            .delete_snapshot(namespace, snapshot_name)
            .await
            .map_err(|e| ControllerError::Cleanup(format!("snapshot {}: {}", snapshot_name, e)))?;
        debug!(snapshot = %snapshot_name, "Deleted snapshot");
    }

    Ok(CleanupOutcome::Done)
}

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod lifecycle_test;
