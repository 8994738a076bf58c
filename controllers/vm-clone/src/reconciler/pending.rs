//! Pending phase
//!
//! Validates the source and checks that the target VM does not exist yet.
//! A VM source is snapshotted first; a snapshot source goes straight to the
//! restore.

use super::status::{self, StatusPatch};
use super::{CloneContext, Reconciler};
use crate::error::ControllerError;
use crate::lifecycle;
use crate::validation::{validate_source, CloneSource};
use crds::ClonePhase;
use kube_runtime::controller::Action;
use tracing::info;

impl Reconciler {
    pub(crate) async fn reconcile_pending(&self, ctx: &mut CloneContext<'_>) -> Result<Action, ControllerError> {
        let source = match validate_source(self.client.as_ref(), ctx.namespace, &ctx.clone.spec).await {
            Ok(source) => source,
            Err(e @ ControllerError::SourceNotFound(_)) => {
                info!(clone = %ctx.name, namespace = %ctx.namespace, "Waiting for clone source: {}", e);
                let patch =
                    StatusPatch::new().conditions(&ctx.status.conditions, status::blocked(e.reason(), e.to_string()));
                self.patch_status(ctx, patch).await?;
                return Ok(Action::requeue(self.requeue_interval));
            }
            Err(e) => return Err(e),
        };

        match source {
            CloneSource::VirtualMachine(vm_name) => {
                self.check_target_free(ctx).await?;
                let snapshot = lifecycle::create_snapshot(self.client.as_ref(), ctx.clone, ctx.namespace, &vm_name).await?;
                let conditions = status::progressing(
                    ClonePhase::SnapshotInProgress.as_str(),
                    format!("Waiting for snapshot {} of VirtualMachine {}", snapshot, vm_name),
                );
                let patch = StatusPatch::new()
                    .snapshot_name(Some(&snapshot))
                    .target_name(&ctx.target_name())
                    .conditions(&ctx.status.conditions, conditions);
                self.transition(ctx, ClonePhase::SnapshotInProgress, patch).await?;
                Ok(Action::await_change())
            }
            CloneSource::Snapshot(snapshot) => {
                // A user-supplied snapshot is restored from but never recorded for cleanup
                self.start_restore(ctx, &snapshot).await?;
                Ok(Action::await_change())
            }
        }
    }
}
