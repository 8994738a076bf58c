//! Integration tests for the KubeVirt client
//!
//! These tests require a cluster with KubeVirt and its snapshot controller installed.
//! Set KUBEVIRT_TEST_NAMESPACE and KUBEVIRT_TEST_VM to run.

use kubevirt_client::{VirtClient, VirtClientTrait};

async fn client() -> VirtClient {
    let kube = kube::Client::try_default()
        .await
        .expect("Failed to create Kubernetes client");
    VirtClient::new(kube)
}

fn namespace() -> String {
    std::env::var("KUBEVIRT_TEST_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

#[tokio::test]
#[ignore] // Requires running cluster
async fn test_get_virtual_machine() {
    let vm_name = std::env::var("KUBEVIRT_TEST_VM")
        .expect("KUBEVIRT_TEST_VM environment variable must be set");

    let vm = client()
        .await
        .get_virtual_machine(&namespace(), &vm_name)
        .await
        .expect("Failed to get virtual machine");
    assert!(vm.is_some(), "VirtualMachine {} not found", vm_name);
}

#[tokio::test]
#[ignore]
async fn test_missing_snapshot_is_none() {
    let snapshot = client()
        .await
        .get_snapshot(&namespace(), "does-not-exist")
        .await
        .expect("Failed to query snapshot");
    assert!(snapshot.is_none());
}

#[tokio::test]
#[ignore]
async fn test_delete_missing_restore_is_ok() {
    client()
        .await
        .delete_restore(&namespace(), "does-not-exist")
        .await
        .expect("Deleting a missing restore should succeed");
}
