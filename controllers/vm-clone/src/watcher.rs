//! Kubernetes resource watcher.
//!
//! Drives reconciliation of VirtualMachineClone resources with
//! `kube_runtime::Controller`. Snapshots and restores created by the
//! controller are owned by their clone request, so a change to either
//! re-triggers the owning request.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{VirtualMachineClone, VirtualMachineRestore, VirtualMachineSnapshot};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Watches clone requests and the dependents they own.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    clone_api: Api<VirtualMachineClone>,
    snapshot_api: Api<VirtualMachineSnapshot>,
    restore_api: Api<VirtualMachineRestore>,
    concurrency: u16,
}

impl Watcher {
    /// Creates a watcher over one namespace, or all namespaces when `namespace` is `None`.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, namespace: Option<&str>, concurrency: u16) -> Self {
        let (clone_api, snapshot_api, restore_api) = match namespace {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client, ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone()), Api::all(client)),
        };
        Self {
            reconciler,
            clone_api,
            snapshot_api,
            restore_api,
            concurrency,
        }
    }

    /// Watches VirtualMachineClone resources until the watch stream ends.
    pub async fn watch_clones(&self) -> Result<(), ControllerError> {
        info!(concurrency = self.concurrency, "Starting VirtualMachineClone watcher");

        let controller_config = ControllerConfig::default().concurrency(self.concurrency);

        Controller::new(self.clone_api.clone(), watcher::Config::default())
            .owns(self.snapshot_api.clone(), watcher::Config::default())
            .owns(self.restore_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!(clone = %obj.name, "Reconciled VirtualMachineClone"),
                    Err(e) => warn!("Controller error for VirtualMachineClone: {}", e),
                }
            })
            .await;

        info!("VirtualMachineClone watcher stopped");
        Ok(())
    }
}

fn resource_key(clone: &VirtualMachineClone) -> String {
    format!(
        "{}/{}",
        clone.namespace().unwrap_or_else(|| "default".to_string()),
        clone.name_any()
    )
}

async fn reconcile(clone: Arc<VirtualMachineClone>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let key = resource_key(&clone);
    match reconciler.reconcile_clone(&clone).await {
        Ok(action) => {
            reconciler.reset_error(&key);
            Ok(action)
        }
        Err(e) => {
            reconciler.increment_error(&key);
            error!(clone = %key, "Reconciliation failed: {}", e);
            Err(e)
        }
    }
}

/// Requeue with the per-request Fibonacci backoff
fn error_policy(clone: Arc<VirtualMachineClone>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let key = resource_key(&clone);
    let (backoff_secs, error_count) = reconciler.get_backoff_for_resource(&key);
    warn!(
        clone = %key,
        error_count,
        backoff_secs,
        "Requeueing after error: {}",
        error
    );
    Action::requeue(Duration::from_secs(backoff_secs))
}
