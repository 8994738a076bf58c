//! Controller configuration
//!
//! Read once at startup from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONCURRENCY: u16 = 4;
const DEFAULT_REQUEUE_SECS: u64 = 5;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8443";
const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;

/// Runtime settings of the clone controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,
    /// Maximum number of clone requests reconciled at once
    pub concurrency: u16,
    /// Delay between re-checks while cleanup is deferred or the source is missing
    pub requeue_interval: Duration,
    /// Admission webhook and health check listener
    pub bind_addr: SocketAddr,
    /// Directory holding `tls.crt` and `tls.key`; plain HTTP when `None`
    pub cert_dir: Option<PathBuf>,
    /// Lower bound of the transient-error backoff, in seconds
    pub backoff_min_secs: u64,
    /// Upper bound of the transient-error backoff, in seconds
    pub backoff_max_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: DEFAULT_CONCURRENCY,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_SECS),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            cert_dir: None,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let concurrency = parse_or(&lookup, "CLONE_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "CLONE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        let requeue_secs = parse_or(&lookup, "CLEANUP_REQUEUE_SECS", DEFAULT_REQUEUE_SECS)?;
        let bind_addr = parse_or(
            &lookup,
            "WEBHOOK_BIND_ADDR",
            SocketAddr::from_str(DEFAULT_BIND_ADDR)
                .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?,
        )?;
        let cert_dir = lookup("WEBHOOK_CERT_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        let backoff_min_secs = parse_or(&lookup, "BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS)?;
        let backoff_max_secs = parse_or(&lookup, "BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)?;
        if backoff_min_secs == 0 || backoff_min_secs > backoff_max_secs {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < BACKOFF_MIN_SECS <= BACKOFF_MAX_SECS (got {} and {})",
                backoff_min_secs, backoff_max_secs
            )));
        }

        Ok(Self {
            namespace,
            concurrency,
            requeue_interval: Duration::from_secs(requeue_secs),
            bind_addr,
            cert_dir,
            backoff_min_secs,
            backoff_max_secs,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
        _ => Ok(default),
    }
}
