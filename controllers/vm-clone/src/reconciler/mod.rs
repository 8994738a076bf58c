//! Reconciliation logic for VirtualMachineClone.
//!
//! One handler per phase:
//! - `pending`: validate the source, snapshot a VM source
//! - `snapshot_in_progress`: wait for the snapshot, then create the restore
//! - `restore_in_progress`: wait for the restore to finish
//! - `succeeded`: delete the dependents the controller created
//!
//! Every decision is taken from the request's status and the live state of
//! its dependents, so a reconcile can be repeated or resumed after a restart.

pub mod pending;
pub mod restore_in_progress;
pub mod snapshot_in_progress;
pub mod status;
pub mod succeeded;

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::lifecycle::{clone_uid, default_target_name};
use crds::{ClonePhase, VirtualMachineClone, VirtualMachineCloneStatus};
use kube_runtime::controller::Action;
use kubevirt_client::VirtClientTrait;
use status::StatusPatch;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// The clone request being reconciled, with its status as last observed
pub(crate) struct CloneContext<'a> {
    pub(crate) clone: &'a VirtualMachineClone,
    pub(crate) namespace: &'a str,
    pub(crate) name: &'a str,
    pub(crate) status: VirtualMachineCloneStatus,
    /// Version every status write is conditional on, advanced by each write
    pub(crate) resource_version: Option<String>,
}

impl CloneContext<'_> {
    /// Target VM name: recorded in status, requested in spec, or derived from the UID
    pub(crate) fn target_name(&self) -> String {
        self.status
            .target_name
            .clone()
            .or_else(|| self.clone.spec.target.as_ref().map(|t| t.name.clone()))
            .unwrap_or_else(|| default_target_name(&clone_uid(self.clone)))
    }

    pub(crate) fn uid(&self) -> String {
        clone_uid(self.clone)
    }
}

/// Reconciles VirtualMachineClone resources.
pub struct Reconciler {
    pub(crate) client: Box<dyn VirtClientTrait>,
    /// Delay before re-checking a missing source or deferred cleanup
    pub(crate) requeue_interval: Duration,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl VirtClientTrait + 'static,
        requeue_interval: Duration,
        backoff_min_secs: u64,
        backoff_max_secs: u64,
    ) -> Self {
        Self {
            client: Box::new(client),
            requeue_interval,
            backoff_min_secs,
            backoff_max_secs,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciles one VirtualMachineClone.
    ///
    /// Terminal errors are recorded as a Failed phase and end the request;
    /// every other error is returned for the watcher to retry with backoff.
    pub async fn reconcile_clone(&self, clone: &VirtualMachineClone) -> Result<Action, ControllerError> {
        let name = clone
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("VirtualMachineClone missing name".to_string()))?;
        let namespace = clone.metadata.namespace.as_deref().unwrap_or("default");

        let mut ctx = CloneContext {
            clone,
            namespace,
            name,
            status: clone.status.clone().unwrap_or_default(),
            resource_version: clone.metadata.resource_version.clone(),
        };
        debug!(clone = %name, namespace = %namespace, phase = %ctx.status.phase, "Reconciling VirtualMachineClone");

        match self.reconcile_phase(&mut ctx).await {
            Err(e) if e.is_terminal() => {
                self.fail(&mut ctx, &e).await?;
                Ok(Action::await_change())
            }
            other => other,
        }
    }

    async fn reconcile_phase(&self, ctx: &mut CloneContext<'_>) -> Result<Action, ControllerError> {
        if ctx.status.phase == ClonePhase::Unset {
            let target_name = ctx.target_name();
            let conditions = status::progressing("Pending", "Clone request accepted");
            let patch = StatusPatch::new()
                .phase(ClonePhase::Pending)
                .target_name(&target_name)
                .conditions(&ctx.status.conditions, conditions.clone());
            self.patch_status(ctx, patch).await?;
            ctx.status.phase = ClonePhase::Pending;
            ctx.status.target_name = Some(target_name);
            ctx.status.conditions = status::merge_conditions(&ctx.status.conditions, conditions);
        }

        match ctx.status.phase {
            ClonePhase::Unset | ClonePhase::Pending => self.reconcile_pending(ctx).await,
            ClonePhase::SnapshotInProgress => self.reconcile_snapshot_in_progress(ctx).await,
            ClonePhase::RestoreInProgress => self.reconcile_restore_in_progress(ctx).await,
            ClonePhase::Succeeded => self.reconcile_succeeded(ctx).await,
            ClonePhase::Failed => Ok(Action::await_change()),
        }
    }

    /// Merge-patch the status subresource of the version last seen.
    ///
    /// A concurrent writer makes the patch fail with a conflict, so a stale
    /// copy of the request can never overwrite a newer status.
    pub(crate) async fn patch_status(&self, ctx: &mut CloneContext<'_>, patch: StatusPatch) -> Result<(), ControllerError> {
        let patch = patch.resource_version(ctx.resource_version.as_deref());
        let updated = self
            .client
            .patch_clone_status(ctx.namespace, ctx.name, &patch.into_value())
            .await?;
        ctx.resource_version = updated.metadata.resource_version;
        Ok(())
    }

    /// Move to `next`, checking the transition first
    pub(crate) async fn transition(
        &self,
        ctx: &mut CloneContext<'_>,
        next: ClonePhase,
        patch: StatusPatch,
    ) -> Result<(), ControllerError> {
        let current = ctx.status.phase;
        if !current.can_transition_to(next) {
            warn!(clone = %ctx.name, from = %current, to = %next, "Refusing phase transition");
            return Ok(());
        }
        self.patch_status(ctx, patch.phase(next)).await?;
        info!(clone = %ctx.name, namespace = %ctx.namespace, from = %current, to = %next, "Phase transition");
        ctx.status.phase = next;
        Ok(())
    }

    /// Record a terminal error as the Failed phase
    async fn fail(&self, ctx: &mut CloneContext<'_>, error: &ControllerError) -> Result<(), ControllerError> {
        if ctx.status.phase.is_terminal() {
            warn!(clone = %ctx.name, phase = %ctx.status.phase, "Ignoring error on finished clone: {}", error);
            return Ok(());
        }
        warn!(clone = %ctx.name, namespace = %ctx.namespace, reason = error.reason(), "Clone failed: {}", error);
        let patch = StatusPatch::new()
            .phase(ClonePhase::Failed)
            .conditions(&ctx.status.conditions, status::failed(error.reason(), error.to_string()));
        self.patch_status(ctx, patch).await?;
        ctx.status.phase = ClonePhase::Failed;
        Ok(())
    }

    /// Get the Fibonacci backoff duration for a resource based on its error count
    ///
    /// Returns (backoff_seconds, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs));
                let backoff_seconds = state.backoff.next_backoff_seconds();
                (backoff_seconds, state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
                (self.backoff_max_secs, 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs))
                .increment_error();
        }
    }

    /// Forget the backoff state of a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }

    /// Number of resources with backoff state
    #[cfg(test)]
    pub(crate) fn tracked_resources(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or(0)
    }
}
