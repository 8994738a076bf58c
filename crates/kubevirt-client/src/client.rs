//! KubeVirt API client
//!
//! Implements `VirtClientTrait` on top of `kube::Api`. Every call is a single
//! request against the API server; nothing is cached between calls.

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
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Kubernetes-backed KubeVirt client
#[derive(Clone)]
pub struct VirtClient {
    client: Client,
}

impl std::fmt::Debug for VirtClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtClient").finish_non_exhaustive()
    }
}

impl VirtClient {
    /// Create a new client from a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying kube client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn get_opt<K>(api: &Api<K>, namespace: &str, name: &str) -> Result<Option<K>, VirtError>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    api.get_opt(name)
        .await
        .map_err(|e| VirtError::from_kube(e, &format!("{}/{}", namespace, name)))
}

async fn create<K>(api: &Api<K>, namespace: &str, object: &K) -> Result<K, VirtError>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = object.meta().name.clone().unwrap_or_default();
    debug!(namespace = %namespace, name = %name, "Creating object");
    api.create(&PostParams::default(), object)
        .await
        .map_err(|e| VirtError::from_kube(e, &format!("{}/{}", namespace, name)))
}

async fn delete<K>(api: &Api<K>, namespace: &str, name: &str) -> Result<(), VirtError>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    debug!(namespace = %namespace, name = %name, "Deleting object");
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) => match VirtError::from_kube(e, &format!("{}/{}", namespace, name)) {
            VirtError::NotFound(_) => Ok(()),
            other => Err(other),
        },
    }
}

#[async_trait::async_trait]
impl VirtClientTrait for VirtClient {
    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, VirtError> {
        get_opt(&self.namespaced::<VirtualMachine>(namespace), namespace, name).await
    }

    async fn get_snapshot(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshot>, VirtError> {
        get_opt(&self.namespaced::<VirtualMachineSnapshot>(namespace), namespace, name).await
    }

    async fn create_snapshot(&self, namespace: &str, snapshot: &VirtualMachineSnapshot) -> Result<VirtualMachineSnapshot, VirtError> {
        create(&self.namespaced(namespace), namespace, snapshot).await
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        delete(&self.namespaced::<VirtualMachineSnapshot>(namespace), namespace, name).await
    }

    async fn get_snapshot_content(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshotContent>, VirtError> {
        get_opt(&self.namespaced::<VirtualMachineSnapshotContent>(namespace), namespace, name).await
    }

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineRestore>, VirtError> {
        get_opt(&self.namespaced::<VirtualMachineRestore>(namespace), namespace, name).await
    }

    async fn create_restore(&self, namespace: &str, restore: &VirtualMachineRestore) -> Result<VirtualMachineRestore, VirtError> {
        create(&self.namespaced(namespace), namespace, restore).await
    }

    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        delete(&self.namespaced::<VirtualMachineRestore>(namespace), namespace, name).await
    }

    async fn get_controller_revision(&self, namespace: &str, name: &str) -> Result<Option<ControllerRevision>, VirtError> {
        get_opt(&self.namespaced::<ControllerRevision>(namespace), namespace, name).await
    }

    async fn create_controller_revision(&self, namespace: &str, revision: &ControllerRevision) -> Result<ControllerRevision, VirtError> {
        create(&self.namespaced(namespace), namespace, revision).await
    }

    async fn set_controller_revision_owner(&self, namespace: &str, name: &str, owner: &OwnerReference) -> Result<(), VirtError> {
        let api: Api<ControllerRevision> = self.namespaced(namespace);
        let patch = serde_json::json!({ "metadata": { "ownerReferences": [owner] } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| VirtError::from_kube(e, &format!("{}/{}", namespace, name)))?;
        debug!(namespace, name, owner = %owner.name, "Set ControllerRevision owner");
        Ok(())
    }

    async fn get_persistent_volume_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>, VirtError> {
        get_opt(&self.namespaced::<PersistentVolumeClaim>(namespace), namespace, name).await
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>, VirtError> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| VirtError::from_kube(e, name))
    }

    async fn patch_clone_status(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<VirtualMachineClone, VirtError> {
        let api: Api<VirtualMachineClone> = self.namespaced(namespace);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| VirtError::from_kube(e, &format!("{}/{}", namespace, name)))
    }
}
