//! VM clone CRD definitions
//!
//! The `VirtualMachineClone` custom resource owned by the clone controller,
//! plus typed projections of the KubeVirt kinds it reads and creates.

pub mod references;
pub mod restore;
pub mod snapshot;
pub mod virtual_machine;
pub mod virtual_machine_clone;

pub use references::*;
pub use restore::*;
pub use snapshot::*;
pub use virtual_machine::*;
pub use virtual_machine_clone::*;
