//! Snapshot and restore engine stand-ins for MockVirtClient
//!
//! The controller only observes the snapshot and restore engines through the
//! status of the objects it creates. These helpers advance that status the
//! way the engines would, so tests can walk a clone through every phase.

use super::{MockVirtClient, key, lock};
use crate::error::VirtError;
use crds::{
    CapturedVirtualMachine, SnapshotContentSource, VirtualMachine,
    VirtualMachineRestoreStatus, VirtualMachineSnapshotContent, VirtualMachineSnapshotContentSpec,
    VirtualMachineSnapshotStatus, VolumeBackup, VolumeRestore,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

impl MockVirtClient {
    /// Capture the snapshot's source VM into a content object and mark the snapshot ready.
    ///
    /// Every PVC or DataVolume backed volume of the VM gets a volume backup.
    /// Returns the content name.
    pub fn complete_snapshot(&self, namespace: &str, snapshot_name: &str) -> Result<String, VirtError> {
        let snapshot = self
            .snapshot(namespace, snapshot_name)
            .ok_or_else(|| VirtError::NotFound(format!("{}/{}", namespace, snapshot_name)))?;
        let vm = lock(&self.virtual_machines)
            .get(&key(namespace, &snapshot.spec.source.name))
            .cloned()
            .ok_or_else(|| VirtError::NotFound(format!("{}/{}", namespace, snapshot.spec.source.name)))?;

        let content_name = format!("vmsnapshot-content-{}", snapshot_name);
        let volume_backups = vm
            .spec
            .persistent_volume_names()
            .into_iter()
            .map(|volume| VolumeBackup {
                volume_name: volume.to_string(),
                volume_snapshot_name: Some(format!("vmsnapshot-{}-volume-{}", snapshot_name, volume)),
                extra: Default::default(),
            })
            .collect();
        let content = capture(&content_name, snapshot_name, &vm, volume_backups);
        self.add_snapshot_content(namespace, content);

        if let Some(stored) = lock(&self.snapshots).get_mut(&key(namespace, snapshot_name)) {
            stored.status = Some(VirtualMachineSnapshotStatus {
                ready_to_use: Some(true),
                virtual_machine_snapshot_content_name: Some(content_name.clone()),
                phase: Some("Succeeded".to_string()),
                ..Default::default()
            });
        }
        Ok(content_name)
    }

    /// Materialize the restore target and mark the restore complete.
    ///
    /// The target VM is the captured VM with the restore's patches applied,
    /// named after the restore target and given the UID `uid-<name>`.
    /// `claims` lists the restored (volume name, PVC name) pairs reported in status.
    pub fn complete_restore(
        &self,
        namespace: &str,
        restore_name: &str,
        claims: &[(&str, &str)],
    ) -> Result<VirtualMachine, VirtError> {
        let restore = self
            .restore(namespace, restore_name)
            .ok_or_else(|| VirtError::NotFound(format!("{}/{}", namespace, restore_name)))?;
        let snapshot = self
            .snapshot(namespace, &restore.spec.virtual_machine_snapshot_name)
            .ok_or_else(|| {
                VirtError::NotFound(format!("{}/{}", namespace, restore.spec.virtual_machine_snapshot_name))
            })?;
        let content_name = snapshot
            .content_name()
            .ok_or_else(|| VirtError::NotFound(format!("content of {}/{}", namespace, restore_name)))?
            .to_string();
        let content = lock(&self.snapshot_contents)
            .get(&key(namespace, &content_name))
            .cloned()
            .ok_or_else(|| VirtError::NotFound(format!("{}/{}", namespace, content_name)))?;
        let captured = content
            .captured_vm()
            .cloned()
            .ok_or_else(|| VirtError::NotFound(format!("captured VM in {}/{}", namespace, content_name)))?;

        let mut document = serde_json::to_value(CapturedVirtualMachine { status: None, ..captured })?;
        for raw in &restore.spec.patches {
            let operation: json_patch::PatchOperation = serde_json::from_str(raw)?;
            json_patch::patch(&mut document, &[operation])
                .map_err(|e| VirtError::Conflict(format!("restore patch failed: {}", e)))?;
        }
        if let Some(object) = document.as_object_mut() {
            object.insert("apiVersion".to_string(), "kubevirt.io/v1".into());
            object.insert("kind".to_string(), "VirtualMachine".into());
            object.remove("status");
        }
        let mut target: VirtualMachine = serde_json::from_value(document)?;
        target.metadata.name = Some(restore.spec.target.name.clone());
        target.metadata.namespace = Some(namespace.to_string());
        target.metadata.uid = Some(format!("uid-{}", restore.spec.target.name));
        self.add_virtual_machine(namespace, target.clone());

        if let Some(stored) = lock(&self.restores).get_mut(&key(namespace, restore_name)) {
            stored.status = Some(VirtualMachineRestoreStatus {
                complete: Some(true),
                restores: claims
                    .iter()
                    .map(|(volume, claim)| VolumeRestore {
                        volume_name: (*volume).to_string(),
                        persistent_volume_claim_name: (*claim).to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            });
        }
        Ok(target)
    }
}

/// Build a content object holding a copy of `vm`
pub(crate) fn capture(
    content_name: &str,
    snapshot_name: &str,
    vm: &VirtualMachine,
    volume_backups: Vec<VolumeBackup>,
) -> VirtualMachineSnapshotContent {
    let captured = CapturedVirtualMachine {
        metadata: ObjectMeta {
            name: vm.metadata.name.clone(),
            namespace: vm.metadata.namespace.clone(),
            labels: vm.metadata.labels.clone(),
            annotations: vm.metadata.annotations.clone(),
            ..Default::default()
        },
        spec: vm.spec.clone(),
        status: vm.status.clone(),
    };
    VirtualMachineSnapshotContent::new(
        content_name,
        VirtualMachineSnapshotContentSpec {
            virtual_machine_snapshot_name: Some(snapshot_name.to_string()),
            source: SnapshotContentSource {
                virtual_machine: Some(captured),
                extra: Default::default(),
            },
            volume_backups,
            extra: Default::default(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virt_trait::VirtClientTrait;
    use crds::{ObjectReference, VirtualMachineSnapshot, VirtualMachineSnapshotSpec, VirtualMachineSpec};

    fn vm(name: &str) -> VirtualMachine {
        let mut vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "apiVersion": "kubevirt.io/v1",
            "kind": "VirtualMachine",
            "metadata": {"name": name, "labels": {"app": "demo"}},
            "spec": {
                "template": {"spec": {"volumes": [{"name": "rootdisk", "dataVolume": {"name": "dv-root"}}]}}
            }
        }))
        .unwrap();
        vm.metadata.namespace = Some("default".to_string());
        vm
    }

    #[tokio::test]
    async fn test_complete_snapshot_captures_vm() {
        let client = MockVirtClient::new();
        client.add_virtual_machine("default", vm("vm-a"));
        client.add_snapshot(
            "default",
            VirtualMachineSnapshot::new(
                "snap",
                VirtualMachineSnapshotSpec {
                    source: ObjectReference::virtual_machine("vm-a"),
                    extra: Default::default(),
                },
            ),
        );

        let content_name = client.complete_snapshot("default", "snap").unwrap();
        let snapshot = client.get_snapshot("default", "snap").await.unwrap().unwrap();
        assert!(snapshot.is_ready());
        assert_eq!(snapshot.content_name(), Some(content_name.as_str()));

        let content = client
            .get_snapshot_content("default", &content_name)
            .await
            .unwrap()
            .unwrap();
        assert!(content.backs_up("rootdisk"));
        let expected: VirtualMachineSpec = vm("vm-a").spec;
        assert_eq!(content.captured_vm().map(|c| c.spec.clone()), Some(expected));
    }
}
