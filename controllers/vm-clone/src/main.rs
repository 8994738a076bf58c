//! VM Clone Controller
//!
//! Reconciles `VirtualMachineClone` requests into new KubeVirt virtual
//! machines: the source VM is snapshotted, the snapshot is restored into a
//! new VM with filtered metadata and a fresh identity, and the temporary
//! snapshot and restore are deleted once the target's volumes are bound.
//!
//! Also serves the validating admission webhook for clone requests.

mod backoff;
mod config;
mod controller;
mod error;
mod filter;
mod identity;
mod lifecycle;
mod reconciler;
mod validation;
mod watcher;
mod webhook;
#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and axum-server both build rustls configs; pick one provider for the process
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting VM Clone Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Concurrency: {}", config.concurrency);
    info!("  Cleanup requeue: {:?}", config.requeue_interval);
    info!("  Backoff: {}s..{}s", config.backoff_min_secs, config.backoff_max_secs);
    info!("  Webhook: {} ({})", config.bind_addr, if config.cert_dir.is_some() { "TLS" } else { "plain HTTP" });

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
