//! Print the VirtualMachineClone CRD as YAML

use crds::VirtualMachineClone;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&VirtualMachineClone::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
    println!("{crd}");
    Ok(())
}
