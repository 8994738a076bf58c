//! Mock VirtClient for unit testing
//!
//! This module provides an in-memory implementation of `VirtClientTrait` so the
//! reconcile path can be exercised without a cluster.
//!
//! - `engine.rs` - helpers that play the part of the snapshot and restore engines

mod engine;

use crate::error::VirtError;
use crate::virt_trait::VirtClientTrait;
use crds::{
    VirtualMachine, VirtualMachineClone, VirtualMachineRestore, VirtualMachineSnapshot,
    VirtualMachineSnapshotContent,
};
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Objects keyed by (namespace, name)
pub(crate) type Store<T> = Arc<Mutex<HashMap<(String, String), T>>>;

/// Client operations that can be made to fail once with `fail_next`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetVirtualMachine,
    GetSnapshot,
    CreateSnapshot,
    DeleteSnapshot,
    GetSnapshotContent,
    GetRestore,
    CreateRestore,
    DeleteRestore,
    GetControllerRevision,
    CreateControllerRevision,
    SetControllerRevisionOwner,
    GetPersistentVolumeClaim,
    GetStorageClass,
    PatchCloneStatus,
}

/// Mock VirtClient for testing
///
/// Stores objects in memory. Status patches on clones are applied with JSON
/// merge-patch semantics, like the API server does for `Patch::Merge`, and
/// every write bumps the clone's resource version.
#[derive(Clone, Default)]
pub struct MockVirtClient {
    pub(crate) virtual_machines: Store<VirtualMachine>,
    pub(crate) snapshots: Store<VirtualMachineSnapshot>,
    pub(crate) snapshot_contents: Store<VirtualMachineSnapshotContent>,
    pub(crate) restores: Store<VirtualMachineRestore>,
    pub(crate) controller_revisions: Store<ControllerRevision>,
    pub(crate) claims: Store<PersistentVolumeClaim>,
    pub(crate) storage_classes: Arc<Mutex<HashMap<String, StorageClass>>>,
    pub(crate) clones: Store<VirtualMachineClone>,
    // One-shot failures
    pub(crate) failures: Arc<Mutex<HashSet<Operation>>>,
}

impl std::fmt::Debug for MockVirtClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVirtClient").finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn object_key<K: Resource>(namespace: &str, object: &K) -> (String, String) {
    let name = object.meta().name.clone().unwrap_or_default();
    key(namespace, &name)
}

fn insert_new<K: Resource + Clone>(store: &Store<K>, namespace: &str, object: &K) -> Result<K, VirtError> {
    let k = object_key(namespace, object);
    let mut objects = lock(store);
    if objects.contains_key(&k) {
        return Err(VirtError::AlreadyExists(format!("{}/{}", k.0, k.1)));
    }
    let mut stored = object.clone();
    stored.meta_mut().namespace = Some(namespace.to_string());
    objects.insert(k, stored.clone());
    Ok(stored)
}

impl MockVirtClient {
    /// Create an empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with a transient conflict
    pub fn fail_next(&self, operation: Operation) {
        lock(&self.failures).insert(operation);
    }

    fn check_failure(&self, operation: Operation) -> Result<(), VirtError> {
        if lock(&self.failures).remove(&operation) {
            return Err(VirtError::Conflict(format!("injected failure for {:?}", operation)));
        }
        Ok(())
    }

    /// Add a virtual machine to the mock store (for test setup)
    pub fn add_virtual_machine(&self, namespace: &str, vm: VirtualMachine) {
        lock(&self.virtual_machines).insert(object_key(namespace, &vm), vm);
    }

    /// Add a snapshot to the mock store (for test setup)
    pub fn add_snapshot(&self, namespace: &str, snapshot: VirtualMachineSnapshot) {
        lock(&self.snapshots).insert(object_key(namespace, &snapshot), snapshot);
    }

    /// Add a snapshot content to the mock store (for test setup)
    pub fn add_snapshot_content(&self, namespace: &str, content: VirtualMachineSnapshotContent) {
        lock(&self.snapshot_contents).insert(object_key(namespace, &content), content);
    }

    /// Add a restore to the mock store (for test setup)
    pub fn add_restore(&self, namespace: &str, restore: VirtualMachineRestore) {
        lock(&self.restores).insert(object_key(namespace, &restore), restore);
    }

    /// Add a controller revision to the mock store (for test setup)
    pub fn add_controller_revision(&self, namespace: &str, revision: ControllerRevision) {
        lock(&self.controller_revisions).insert(object_key(namespace, &revision), revision);
    }

    /// Add a persistent volume claim to the mock store (for test setup)
    pub fn add_persistent_volume_claim(&self, namespace: &str, claim: PersistentVolumeClaim) {
        lock(&self.claims).insert(object_key(namespace, &claim), claim);
    }

    /// Add a storage class to the mock store (for test setup)
    pub fn add_storage_class(&self, class: StorageClass) {
        let name = class.metadata.name.clone().unwrap_or_default();
        lock(&self.storage_classes).insert(name, class);
    }

    /// Add a clone request to the mock store (for test setup)
    ///
    /// A clone without a resource version is stored at version "1".
    pub fn add_clone(&self, namespace: &str, mut clone: VirtualMachineClone) {
        clone.metadata.resource_version.get_or_insert_with(|| "1".to_string());
        lock(&self.clones).insert(object_key(namespace, &clone), clone);
    }

    /// Current state of a clone request, with all status patches applied
    pub fn clone_request(&self, namespace: &str, name: &str) -> Option<VirtualMachineClone> {
        lock(&self.clones).get(&key(namespace, name)).cloned()
    }

    /// Snapshot currently stored under the given name
    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<VirtualMachineSnapshot> {
        lock(&self.snapshots).get(&key(namespace, name)).cloned()
    }

    /// Restore currently stored under the given name
    pub fn restore(&self, namespace: &str, name: &str) -> Option<VirtualMachineRestore> {
        lock(&self.restores).get(&key(namespace, name)).cloned()
    }

    /// Controller revision currently stored under the given name
    pub fn controller_revision(&self, namespace: &str, name: &str) -> Option<ControllerRevision> {
        lock(&self.controller_revisions).get(&key(namespace, name)).cloned()
    }

    /// Number of stored snapshots in a namespace
    pub fn snapshot_count(&self, namespace: &str) -> usize {
        lock(&self.snapshots).keys().filter(|(ns, _)| ns == namespace).count()
    }

    /// Number of stored restores in a namespace
    pub fn restore_count(&self, namespace: &str) -> usize {
        lock(&self.restores).keys().filter(|(ns, _)| ns == namespace).count()
    }
}

#[async_trait::async_trait]
impl VirtClientTrait for MockVirtClient {
    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, VirtError> {
        self.check_failure(Operation::GetVirtualMachine)?;
        Ok(lock(&self.virtual_machines).get(&key(namespace, name)).cloned())
    }

    async fn get_snapshot(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshot>, VirtError> {
        self.check_failure(Operation::GetSnapshot)?;
        Ok(self.snapshot(namespace, name))
    }

    async fn create_snapshot(&self, namespace: &str, snapshot: &VirtualMachineSnapshot) -> Result<VirtualMachineSnapshot, VirtError> {
        self.check_failure(Operation::CreateSnapshot)?;
        insert_new(&self.snapshots, namespace, snapshot)
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        self.check_failure(Operation::DeleteSnapshot)?;
        lock(&self.snapshots).remove(&key(namespace, name));
        Ok(())
    }

    async fn get_snapshot_content(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshotContent>, VirtError> {
        self.check_failure(Operation::GetSnapshotContent)?;
        Ok(lock(&self.snapshot_contents).get(&key(namespace, name)).cloned())
    }

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineRestore>, VirtError> {
        self.check_failure(Operation::GetRestore)?;
        Ok(self.restore(namespace, name))
    }

    async fn create_restore(&self, namespace: &str, restore: &VirtualMachineRestore) -> Result<VirtualMachineRestore, VirtError> {
        self.check_failure(Operation::CreateRestore)?;
        insert_new(&self.restores, namespace, restore)
    }

    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        self.check_failure(Operation::DeleteRestore)?;
        lock(&self.restores).remove(&key(namespace, name));
        Ok(())
    }

    async fn get_controller_revision(&self, namespace: &str, name: &str) -> Result<Option<ControllerRevision>, VirtError> {
        self.check_failure(Operation::GetControllerRevision)?;
        Ok(self.controller_revision(namespace, name))
    }

    async fn create_controller_revision(&self, namespace: &str, revision: &ControllerRevision) -> Result<ControllerRevision, VirtError> {
        self.check_failure(Operation::CreateControllerRevision)?;
        insert_new(&self.controller_revisions, namespace, revision)
    }

    async fn set_controller_revision_owner(&self, namespace: &str, name: &str, owner: &OwnerReference) -> Result<(), VirtError> {
        self.check_failure(Operation::SetControllerRevisionOwner)?;
        let mut revisions = lock(&self.controller_revisions);
        let revision = revisions
            .get_mut(&key(namespace, name))
            .ok_or_else(|| VirtError::NotFound(format!("{}/{}", namespace, name)))?;
        revision.metadata.owner_references = Some(vec![owner.clone()]);
        Ok(())
    }

    async fn get_persistent_volume_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>, VirtError> {
        self.check_failure(Operation::GetPersistentVolumeClaim)?;
        Ok(lock(&self.claims).get(&key(namespace, name)).cloned())
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>, VirtError> {
        self.check_failure(Operation::GetStorageClass)?;
        Ok(lock(&self.storage_classes).get(name).cloned())
    }

    async fn patch_clone_status(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<VirtualMachineClone, VirtError> {
        self.check_failure(Operation::PatchCloneStatus)?;
        let mut clones = lock(&self.clones);
        let clone = clones
            .get_mut(&key(namespace, name))
            .ok_or_else(|| VirtError::NotFound(format!("{}/{}", namespace, name)))?;

        let stored_version = clone.metadata.resource_version.clone().unwrap_or_default();
        if let Some(expected) = patch.pointer("/metadata/resourceVersion").and_then(|v| v.as_str()) {
            if expected != stored_version {
                return Err(VirtError::Conflict(format!(
                    "{}/{}: resourceVersion {} is stale, stored {}",
                    namespace, name, expected, stored_version
                )));
            }
        }

        let mut current = serde_json::to_value(&*clone)?;
        // Only the status subresource is writable through this call
        if let Some(status) = patch.get("status") {
            json_patch::merge(&mut current, &serde_json::json!({ "status": status }));
        }
        let mut updated: VirtualMachineClone = serde_json::from_value(current)?;
        let next_version = stored_version.parse::<u64>().unwrap_or(0) + 1;
        updated.metadata.resource_version = Some(next_version.to_string());
        *clone = updated.clone();
        Ok(updated)
    }
}
