//! SnapshotInProgress phase
//!
//! Waits for the controller's snapshot, then computes the target VM and
//! hands it to the restore engine. The target is computed here and only
//! here; later phases never look at the source again.

use super::status::{self, StatusPatch};
use super::{CloneContext, Reconciler};
use crate::error::ControllerError;
use crate::identity::{build_target, firmware_uuid, restore_patches, Overrides};
use crate::lifecycle::{self, restore_name, revision_name, RevisionKind, SnapshotState};
use crate::validation::validate_target;
use crds::{ClonePhase, ResourceMatcher};
use kube_runtime::controller::Action;
use tracing::{debug, info};

impl Reconciler {
    pub(crate) async fn reconcile_snapshot_in_progress(
        &self,
        ctx: &mut CloneContext<'_>,
    ) -> Result<Action, ControllerError> {
        let snapshot = ctx.status.snapshot_name.clone().ok_or_else(|| {
            ControllerError::ResourceGone("snapshot name missing from status".to_string())
        })?;

        match lifecycle::snapshot_state(self.client.as_ref(), ctx.namespace, &snapshot).await? {
            SnapshotState::Missing => Err(ControllerError::ResourceGone(format!(
                "VirtualMachineSnapshot {}/{} disappeared",
                ctx.namespace, snapshot
            ))),
            SnapshotState::Failed(message) => Err(ControllerError::DependentFailed(format!(
                "VirtualMachineSnapshot {}/{}: {}",
                ctx.namespace, snapshot, message
            ))),
            SnapshotState::InProgress => {
                debug!(clone = %ctx.name, snapshot = %snapshot, "Snapshot not ready yet");
                Ok(Action::await_change())
            }
            SnapshotState::Ready(_) => {
                self.start_restore(ctx, &snapshot).await?;
                Ok(Action::await_change())
            }
        }
    }

    /// Fail the request if its target VM exists and this request's restore did not create it
    pub(crate) async fn check_target_free(&self, ctx: &CloneContext<'_>) -> Result<(), ControllerError> {
        if self
            .client
            .get_restore(ctx.namespace, &restore_name(&ctx.uid()))
            .await?
            .is_some()
        {
            return Ok(());
        }
        validate_target(self.client.as_ref(), ctx.namespace, &ctx.target_name()).await
    }

    /// Build the target from the VM captured in `snapshot` and create the restore
    pub(crate) async fn start_restore(&self, ctx: &mut CloneContext<'_>, snapshot: &str) -> Result<(), ControllerError> {
        self.check_target_free(ctx).await?;
        let client = self.client.as_ref();
        let gone = |what: String| ControllerError::ResourceGone(format!("{} in namespace {}", what, ctx.namespace));

        let content_name = client
            .get_snapshot(ctx.namespace, snapshot)
            .await?
            .ok_or_else(|| gone(format!("VirtualMachineSnapshot {} does not exist", snapshot)))?
            .content_name()
            .map(str::to_string)
            .ok_or_else(|| gone(format!("VirtualMachineSnapshot {} has no content", snapshot)))?;
        let content = client
            .get_snapshot_content(ctx.namespace, &content_name)
            .await?
            .ok_or_else(|| gone(format!("VirtualMachineSnapshotContent {} does not exist", content_name)))?;
        let source = content
            .captured_vm()
            .ok_or_else(|| gone(format!("VirtualMachineSnapshotContent {} holds no VirtualMachine", content_name)))?;

        let target_name = ctx.target_name();
        let uid = ctx.uid();

        let instancetype_revision = self
            .copy_revision(ctx, source.spec.instancetype.as_ref(), &target_name, RevisionKind::Instancetype)
            .await?;
        let preference_revision = self
            .copy_revision(ctx, source.spec.preference.as_ref(), &target_name, RevisionKind::Preference)
            .await?;

        let spec = &ctx.clone.spec;
        let overrides = Overrides {
            mac_addresses: Some(&spec.new_mac_addresses).filter(|macs| !macs.is_empty()),
            serial: spec.new_sm_bios_serial.as_deref(),
            firmware_uuid: firmware_uuid(&uid, &target_name),
            instancetype_revision,
            preference_revision,
        };
        let target = build_target(source, spec, &target_name, &overrides);
        let patches = restore_patches(source, &target)?;
        debug!(clone = %ctx.name, patches = patches.len(), "Computed restore patches");

        let restore =
            lifecycle::create_restore(client, ctx.clone, ctx.namespace, snapshot, &target_name, patches).await?;

        info!(clone = %ctx.name, restore = %restore, target = %target_name, "Restoring clone target");
        let conditions = status::progressing(
            ClonePhase::RestoreInProgress.as_str(),
            format!("Waiting for restore {} into VirtualMachine {}", restore, target_name),
        );
        let patch = StatusPatch::new()
            .restore_name(Some(&restore))
            .target_name(&target_name)
            .conditions(&ctx.status.conditions, conditions);
        self.transition(ctx, ClonePhase::RestoreInProgress, patch).await
    }

    /// Give the target its own copy of a bound revision. Returns the copy's name.
    async fn copy_revision(
        &self,
        ctx: &CloneContext<'_>,
        matcher: Option<&ResourceMatcher>,
        target_name: &str,
        kind: RevisionKind,
    ) -> Result<Option<String>, ControllerError> {
        let Some(source_revision) = matcher.and_then(|m| m.revision_name.as_deref()) else {
            return Ok(None);
        };
        let copy = revision_name(target_name, kind, &ctx.uid());
        lifecycle::copy_revision(self.client.as_ref(), ctx.clone, ctx.namespace, source_revision, &copy).await?;
        Ok(Some(copy))
    }
}
