//! Main controller implementation.
//!
//! Wires the Kubernetes client, the reconciler, the VirtualMachineClone
//! watcher and the admission webhook server, and runs them until one exits.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crate::webhook::{self, WebhookState};
use kube::Client;
use kubevirt_client::VirtClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for VirtualMachineClone resources.
pub struct Controller {
    clone_watcher: JoinHandle<Result<(), ControllerError>>,
    webhook_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing VM Clone Controller");

        let kube_client = Client::try_default().await?;

        let reconciler = Arc::new(Reconciler::new(
            VirtClient::new(kube_client.clone()),
            config.requeue_interval,
            config.backoff_min_secs,
            config.backoff_max_secs,
        ));
        let watcher = Watcher::new(
            reconciler,
            kube_client.clone(),
            config.namespace.as_deref(),
            config.concurrency,
        );
        let webhook_state = Arc::new(WebhookState::new(VirtClient::new(kube_client)));

        let clone_watcher = tokio::spawn(async move { watcher.watch_clones().await });
        let webhook_server = tokio::spawn(async move { webhook::serve(&config, webhook_state).await });

        Ok(Self {
            clone_watcher,
            webhook_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("VM Clone Controller running");

        tokio::select! {
            result = &mut self.clone_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("VirtualMachineClone watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("VirtualMachineClone watcher error: {}", e)))?;
            }
            result = &mut self.webhook_server => {
                result.map_err(|e| ControllerError::Webhook(format!("Webhook server panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
