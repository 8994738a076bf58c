//! KubeVirt client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum VirtError {
    /// Kubernetes API or transport error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create of an object whose name is already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Write rejected because of a concurrent modification
    #[error("Conflict: {0}")]
    Conflict(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VirtError {
    /// Map a kube error onto the typed variants, keeping everything else as `Kube`.
    pub fn from_kube(err: kube::Error, resource: &str) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => VirtError::NotFound(resource.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                VirtError::AlreadyExists(resource.to_string())
            }
            kube::Error::Api(ae) if ae.code == 409 => VirtError::Conflict(resource.to_string()),
            _ => VirtError::Kube(err),
        }
    }

    /// Whether retrying the same call later may succeed
    ///
    /// Transport failures and conflicts are transient. An API rejection is
    /// transient only for throttling, timeouts and server-side failures.
    pub fn is_transient(&self) -> bool {
        match self {
            VirtError::Kube(kube::Error::Api(ae)) => is_transient_status(ae.code),
            VirtError::Kube(_) | VirtError::Conflict(_) => true,
            VirtError::NotFound(_) | VirtError::AlreadyExists(_) | VirtError::Serialization(_) => false,
        }
    }

    /// Whether the error reports an object that is already present
    pub fn is_already_exists(&self) -> bool {
        matches!(self, VirtError::AlreadyExists(_))
    }
}

/// HTTP status codes of API rejections worth retrying
pub fn is_transient_status(code: u16) -> bool {
    matches!(code, 408 | 409 | 429) || code >= 500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VirtError::Conflict("vmclone/a".to_string()).is_transient());
        assert!(!VirtError::NotFound("vmclone/a".to_string()).is_transient());
        assert!(!VirtError::AlreadyExists("vmclone/a".to_string()).is_transient());
        assert!(VirtError::AlreadyExists("vmclone/a".to_string()).is_already_exists());
    }

    #[test]
    fn test_api_rejections_are_permanent() {
        for code in [400, 403, 404, 405, 422] {
            assert!(!is_transient_status(code), "{} should not be retried", code);
        }
        for code in [408, 409, 429, 500, 503, 504] {
            assert!(is_transient_status(code), "{} should be retried", code);
        }
    }

    #[test]
    fn test_serialization_is_permanent() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!VirtError::from(err).is_transient());
    }
}
