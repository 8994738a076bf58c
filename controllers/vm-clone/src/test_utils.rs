//! Test utilities for unit testing the clone controller
//!
//! Builders for clone requests, source VMs and the storage objects the
//! cleanup gate inspects.

use crate::reconciler::Reconciler;
use crds::*;
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimStatus};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use kubevirt_client::MockVirtClient;
use std::collections::BTreeMap;
use std::time::Duration;

pub const TEST_NAMESPACE: &str = "default";

/// Helper to create a clone request with a UID derived from its name
pub fn create_test_clone(
    name: &str,
    namespace: &str,
    source: ObjectReference,
    target: Option<&str>,
) -> VirtualMachineClone {
    let mut clone = VirtualMachineClone::new(
        name,
        VirtualMachineCloneSpec {
            source,
            target: target.map(ObjectReference::virtual_machine),
            label_filters: Vec::new(),
            annotation_filters: Vec::new(),
            template: TemplateFilters::default(),
            new_mac_addresses: BTreeMap::new(),
            new_sm_bios_serial: None,
        },
    );
    clone.metadata.namespace = Some(namespace.to_string());
    clone.metadata.uid = Some(format!("uid-{}", name));
    clone
}

/// Helper to create a stopped VM with one DataVolume disk, two labels and a fixed MAC
pub fn create_test_vm(name: &str, namespace: &str) -> VirtualMachine {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "kubevirt.io/v1",
        "kind": "VirtualMachine",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": {"key1": "value1", "key2": "value2", "kubevirt.io/vm": name},
            "annotations": {"key1": "value1", "key2": "value2", "kubemacpool.io/transaction-timestamp": "now"}
        },
        "spec": {
            "runStrategy": "Halted",
            "template": {
                "metadata": {
                    "labels": {"key1": "value1", "key2": "value2"},
                    "annotations": {"key1": "value1", "key2": "value2"}
                },
                "spec": {
                    "domain": {
                        "devices": {
                            "disks": [{"name": "rootdisk", "disk": {"bus": "virtio"}}],
                            "interfaces": [{"name": "eth0", "masquerade": {}, "macAddress": "02:00:00:00:00:01"}]
                        },
                        "firmware": {"uuid": "5d307ca9-b3ef-428c-8861-06e72d69f223", "serial": "source-serial"},
                        "resources": {"requests": {"memory": "128Mi"}}
                    },
                    "networks": [{"name": "eth0", "pod": {}}],
                    "volumes": [{"name": "rootdisk", "dataVolume": {"name": format!("{}-dv", name)}}]
                }
            }
        },
        "status": {
            "printableStatus": "Stopped",
            "volumeSnapshotStatuses": [{"name": "rootdisk", "enabled": true}]
        }
    }))
    .unwrap()
}

/// Helper to create a PVC in the given phase
pub fn create_test_pvc(name: &str, namespace: &str, phase: &str, storage_class: Option<&str>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: storage_class.map(str::to_string),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

/// Helper to create a storage class with a volume binding mode
pub fn create_test_storage_class(name: &str, binding_mode: &str) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        provisioner: "kubevirt.io/hostpath-provisioner".to_string(),
        volume_binding_mode: Some(binding_mode.to_string()),
        ..Default::default()
    }
}

/// Helper to create an instance type revision
pub fn create_test_revision(name: &str, namespace: &str) -> ControllerRevision {
    ControllerRevision {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(RawExtension(serde_json::json!({
            "apiVersion": "instancetype.kubevirt.io/v1beta1",
            "kind": "VirtualMachineInstancetype",
            "spec": {"cpu": {"guest": 1}, "memory": {"guest": "128Mi"}}
        }))),
        revision: 1,
    }
}

/// Helper to create a reconciler backed by `client`, with a short cleanup requeue
pub fn create_test_reconciler(client: MockVirtClient) -> Reconciler {
    Reconciler::new(client, Duration::from_secs(5), 1, 60)
}
