//! Controller-specific error types.
//!
//! Errors are split by how the reconciler reacts to them: terminal errors fail
//! the clone request, everything else is retried with backoff.

use kube::Error as KubeError;
use kubevirt_client::VirtError;
use thiserror::Error;

/// Errors that can occur in the VM clone controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// KubeVirt or storage API error
    #[error("KubeVirt API error: {0}")]
    Virt(#[from] VirtError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// The clone request can never succeed as specified
    #[error("{0}")]
    Validation(String),

    /// The clone source does not exist (yet)
    #[error("{0}")]
    SourceNotFound(String),

    /// A dependent the controller was tracking disappeared
    #[error("Resource gone: {0}")]
    ResourceGone(String),

    /// The snapshot or restore engine reported a permanent failure
    #[error("Dependent failed: {0}")]
    DependentFailed(String),

    /// Deleting controller-created dependents failed
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Admission webhook server error
    #[error("Webhook server error: {0}")]
    Webhook(String),
}

impl ControllerError {
    /// Whether the error fails the clone request instead of being retried
    ///
    /// An API call the server rejected for good (forbidden, invalid, ...) is
    /// terminal; transport errors, throttling and conflicts are retried.
    pub fn is_terminal(&self) -> bool {
        match self {
            ControllerError::Validation(_)
            | ControllerError::ResourceGone(_)
            | ControllerError::DependentFailed(_) => true,
            ControllerError::Virt(e) => !e.is_transient(),
            _ => false,
        }
    }

    /// Condition reason recorded for a terminal error
    pub fn reason(&self) -> &'static str {
        match self {
            ControllerError::Validation(_) => "ValidationFailed",
            ControllerError::ResourceGone(_) => "ResourceGone",
            ControllerError::DependentFailed(_) => "DependentFailed",
            ControllerError::SourceNotFound(_) => "SourceDoesNotExist",
            ControllerError::Virt(_) => "APIRequestRejected",
            _ => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = ControllerError::Validation(
            "Virtual Machine volume rootdisk does not support snapshots".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "Virtual Machine volume rootdisk does not support snapshots"
        );
        assert!(err.is_terminal());
    }

    #[test]
    fn test_transient_errors_are_not_terminal() {
        assert!(!ControllerError::Virt(VirtError::Conflict("x".to_string())).is_terminal());
        assert!(!ControllerError::Cleanup("x".to_string()).is_terminal());
        assert!(!ControllerError::SourceNotFound("x".to_string()).is_terminal());
    }

    #[test]
    fn test_rejected_api_calls_are_terminal() {
        let err = ControllerError::Virt(VirtError::NotFound("default/vm-b".to_string()));
        assert!(err.is_terminal());
        assert_eq!(err.reason(), "APIRequestRejected");

        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(ControllerError::Virt(VirtError::Serialization(malformed)).is_terminal());
    }
}
