//! RestoreInProgress phase

use super::status::{self, StatusPatch};
use super::{CloneContext, Reconciler};
use crate::error::ControllerError;
use crate::lifecycle::{self, RestoreState};
use crds::ClonePhase;
use kube_runtime::controller::Action;
use tracing::debug;

impl Reconciler {
    /// Wait for the restore; once complete the target owns its revision copies,
    /// the clone has succeeded and cleanup starts right away
    pub(crate) async fn reconcile_restore_in_progress(
        &self,
        ctx: &mut CloneContext<'_>,
    ) -> Result<Action, ControllerError> {
        let restore = ctx.status.restore_name.clone().ok_or_else(|| {
            ControllerError::ResourceGone("restore name missing from status".to_string())
        })?;

        match lifecycle::restore_state(self.client.as_ref(), ctx.namespace, &restore).await? {
            RestoreState::Missing => Err(ControllerError::ResourceGone(format!(
                "VirtualMachineRestore {}/{} disappeared",
                ctx.namespace, restore
            ))),
            RestoreState::InProgress => {
                debug!(clone = %ctx.name, restore = %restore, "Restore not complete yet");
                Ok(Action::await_change())
            }
            RestoreState::Complete => {
                lifecycle::adopt_revisions(self.client.as_ref(), ctx.clone, ctx.namespace, &ctx.target_name()).await?;
                let message = format!("VirtualMachine {} created", ctx.target_name());
                let patch = StatusPatch::new().conditions(&ctx.status.conditions, status::succeeded(message));
                self.transition(ctx, ClonePhase::Succeeded, patch).await?;
                self.reconcile_succeeded(ctx).await
            }
        }
    }
}
