//! Kubernetes object references for clone sources and targets
//!
//! Follows the Kubernetes `TypedLocalObjectReference` pattern with apiGroup, kind and name.
//! References are always local to the namespace of the referencing resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the `VirtualMachine` kind
pub const VM_API_GROUP: &str = "kubevirt.io";

/// API group of the `VirtualMachineSnapshot` and `VirtualMachineRestore` kinds
pub const SNAPSHOT_API_GROUP: &str = "snapshot.kubevirt.io";

/// Kind name of a virtual machine
pub const VIRTUAL_MACHINE_KIND: &str = "VirtualMachine";

/// Kind name of a virtual machine snapshot
pub const VIRTUAL_MACHINE_SNAPSHOT_KIND: &str = "VirtualMachineSnapshot";

/// Kubernetes-compliant local object reference
///
/// This follows the Kubernetes `TypedLocalObjectReference` pattern, which includes:
/// - `apiGroup`: The API group of the referenced resource (e.g., "kubevirt.io")
/// - `kind`: The kind of the referenced resource (e.g., "VirtualMachine")
/// - `name`: The name of the referenced resource (required)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API group of the referenced resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    /// Kind of the referenced resource
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,
}

impl ObjectReference {
    /// Create a new reference with apiGroup, kind, and name
    pub fn new(api_group: &str, kind: &str, name: impl Into<String>) -> Self {
        Self {
            api_group: Some(api_group.to_string()),
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Helper to create a reference to a `VirtualMachine`
    pub fn virtual_machine(name: impl Into<String>) -> Self {
        Self::new(VM_API_GROUP, VIRTUAL_MACHINE_KIND, name)
    }

    /// Helper to create a reference to a `VirtualMachineSnapshot`
    pub fn snapshot(name: impl Into<String>) -> Self {
        Self::new(SNAPSHOT_API_GROUP, VIRTUAL_MACHINE_SNAPSHOT_KIND, name)
    }
}
