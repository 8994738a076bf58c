//! VirtClient trait for mocking
//!
//! This trait abstracts the KubeVirt client to enable mocking in unit tests.
//! The concrete VirtClient implements this trait, and tests use `MockVirtClient`.

use crate::error::VirtError;
use crds::{
    VirtualMachine, VirtualMachineClone, VirtualMachineRestore, VirtualMachineSnapshot,
    VirtualMachineSnapshotContent,
};
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::storage::v1::StorageClass;

/// Trait for the cluster operations of the clone controller
///
/// Getters return `Ok(None)` when the object does not exist. Deletes succeed
/// when the object is already gone. Creates report `VirtError::AlreadyExists`
/// when the name is taken.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait VirtClientTrait: Send + Sync {
    // Virtual machines
    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, VirtError>;

    // Snapshots
    async fn get_snapshot(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshot>, VirtError>;
    async fn create_snapshot(&self, namespace: &str, snapshot: &VirtualMachineSnapshot) -> Result<VirtualMachineSnapshot, VirtError>;
    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), VirtError>;
    async fn get_snapshot_content(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshotContent>, VirtError>;

    // Restores
    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineRestore>, VirtError>;
    async fn create_restore(&self, namespace: &str, restore: &VirtualMachineRestore) -> Result<VirtualMachineRestore, VirtError>;
    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<(), VirtError>;

    // Controller revisions (instance type and preference copies)
    async fn get_controller_revision(&self, namespace: &str, name: &str) -> Result<Option<ControllerRevision>, VirtError>;
    async fn create_controller_revision(&self, namespace: &str, revision: &ControllerRevision) -> Result<ControllerRevision, VirtError>;
    /// Replace the owner references of a revision with `owner`
    async fn set_controller_revision_owner(&self, namespace: &str, name: &str, owner: &OwnerReference) -> Result<(), VirtError>;

    // Storage
    async fn get_persistent_volume_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>, VirtError>;
    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>, VirtError>;

    /// Merge-patch the status subresource of a VirtualMachineClone.
    /// `patch` is the full merge patch body, i.e. `{"status": {...}}`. A
    /// `metadata.resourceVersion` in the body makes the write conditional:
    /// it fails with `VirtError::Conflict` when the stored object has moved on.
    /// Returns the updated object.
    async fn patch_clone_status(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<VirtualMachineClone, VirtError>;
}
