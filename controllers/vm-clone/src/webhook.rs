//! Admission webhook and health check server
//!
//! Validates VirtualMachineClone requests before they are stored:
//! CREATE runs the same source checks the reconciler runs in Pending,
//! UPDATE rejects spec changes, DELETE is always allowed.

use crate::config::Config;
use crate::error::ControllerError;
use crate::validation::{validate_source, validate_target};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use crds::VirtualMachineClone;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use kubevirt_client::VirtClientTrait;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Path the ValidatingWebhookConfiguration points at
pub const VALIDATE_PATH: &str = "/validate-virtualmachineclone";

/// Shared state for handlers
#[derive(Clone)]
pub struct WebhookState {
    pub client: Arc<dyn VirtClientTrait>,
}

impl WebhookState {
    pub fn new(client: impl VirtClientTrait + 'static) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState").finish_non_exhaustive()
    }
}

/// Build the admission and health check router
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(validate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until the listener fails.
///
/// TLS is used when a certificate directory is configured; the API server
/// only calls webhooks over HTTPS, so plain HTTP is for local runs.
pub async fn serve(config: &Config, state: Arc<WebhookState>) -> Result<(), ControllerError> {
    let app = router(state);

    match &config.cert_dir {
        Some(dir) => {
            let tls_config = RustlsConfig::from_pem_file(dir.join("tls.crt"), dir.join("tls.key"))
                .await
                .map_err(|e| ControllerError::Webhook(format!("TLS config error: {}", e)))?;
            info!(addr = %config.bind_addr, cert_dir = %dir.display(), "Starting admission webhook server");
            axum_server::bind_rustls(config.bind_addr, tls_config)
                .serve(app.into_make_service())
                .await
        }
        None => {
            warn!(addr = %config.bind_addr, "No certificate directory configured, serving plain HTTP");
            axum_server::bind(config.bind_addr)
                .serve(app.into_make_service())
                .await
        }
    }
    .map_err(|e| ControllerError::Webhook(format!("Server error: {}", e)))
}

/// Handle validating admission review for VirtualMachineClones
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!("Invalid admission review: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let verdict = match req.operation {
        Operation::Create => admit_create(state.client.as_ref(), &req).await,
        Operation::Update => admit_update(&req),
        _ => Ok(()),
    };

    let response = AdmissionResponse::from(&req);
    let response = match verdict {
        Ok(()) => {
            debug!(name = %req.name, operation = ?req.operation, "Admitted VirtualMachineClone");
            response
        }
        Err(message) => {
            info!(name = %req.name, operation = ?req.operation, "Denied VirtualMachineClone: {}", message);
            response.deny(message)
        }
    };
    Json(response.into_review())
}

async fn admit_create(client: &dyn VirtClientTrait, req: &AdmissionRequest<DynamicObject>) -> Result<(), String> {
    let object = req
        .object
        .as_ref()
        .ok_or_else(|| "admission request carries no object".to_string())?;
    let clone: VirtualMachineClone = serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| format!("invalid VirtualMachineClone: {}", e))?;
    let namespace = req
        .namespace
        .as_deref()
        .or(clone.metadata.namespace.as_deref())
        .unwrap_or("default");

    validate_source(client, namespace, &clone.spec)
        .await
        .map_err(|e| e.to_string())?;
    if let Some(target) = &clone.spec.target {
        validate_target(client, namespace, &target.name)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn admit_update(req: &AdmissionRequest<DynamicObject>) -> Result<(), String> {
    fn spec(object: Option<&DynamicObject>) -> Option<&serde_json::Value> {
        object.and_then(|o| o.data.get("spec"))
    }
    if spec(req.object.as_ref()) == spec(req.old_object.as_ref()) {
        Ok(())
    } else {
        Err("VirtualMachineClone spec is immutable".to_string())
    }
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod webhook_test;
