//! Succeeded phase
//!
//! The phase never changes again. What remains is deleting the snapshot and
//! restore the controller created, once the restored volumes no longer need them.

use super::status::StatusPatch;
use super::{CloneContext, Reconciler};
use crate::error::ControllerError;
use crate::lifecycle::{self, CleanupOutcome};
use kube_runtime::controller::Action;
use tracing::info;

impl Reconciler {
    pub(crate) async fn reconcile_succeeded(&self, ctx: &mut CloneContext<'_>) -> Result<Action, ControllerError> {
        let snapshot = ctx.status.snapshot_name.clone();
        let restore = ctx.status.restore_name.clone();
        if snapshot.is_none() && restore.is_none() {
            return Ok(Action::await_change());
        }

        match lifecycle::cleanup(self.client.as_ref(), ctx.namespace, snapshot.as_deref(), restore.as_deref()).await? {
            CleanupOutcome::Deferred(reason) => {
                info!(clone = %ctx.name, namespace = %ctx.namespace, "Cleanup deferred: {}", reason);
                Ok(Action::requeue(self.requeue_interval))
            }
            CleanupOutcome::Done => {
                self.patch_status(ctx, StatusPatch::new().snapshot_name(None).restore_name(None))
                    .await
                    .map_err(|e| ControllerError::Cleanup(e.to_string()))?;
                ctx.status.snapshot_name = None;
                ctx.status.restore_name = None;
                info!(clone = %ctx.name, namespace = %ctx.namespace, "Cleaned up clone dependents");
                Ok(Action::await_change())
            }
        }
    }
}
