//! Backend health checks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::transport::Transport;

pub const HEALTH_ENDPOINT: &str = "/health";

/// Result of checking one backend.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BackendHealth {
    Healthy { details: Value },
    /// Reachable, but reporting that some of its services are down.
    Degraded { details: Value },
    Unhealthy { error: String },
}

impl BackendHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BackendHealth::Healthy { .. })
    }
}

/// Health of the API (`node`) and media (`python`) backends.
#[derive(Serialize, Debug, Clone)]
pub struct SystemHealth {
    pub node: BackendHealth,
    pub python: BackendHealth,
    pub timestamp: DateTime<Utc>,
}

impl SystemHealth {
    pub fn all_healthy(&self) -> bool {
        self.node.is_healthy() && self.python.is_healthy()
    }
}

/// Classify a successful health reply by its `status` field.
///
/// A missing status, `healthy`, or `ok` is healthy; `degraded` is degraded;
/// anything else is unhealthy.
pub fn classify(details: Value) -> BackendHealth {
    let status = details
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);
    match status.as_deref() {
        None | Some("healthy" | "ok") => BackendHealth::Healthy { details },
        Some("degraded") => BackendHealth::Degraded { details },
        Some(other) => BackendHealth::Unhealthy {
            error: format!("backend reported status {other}"),
        },
    }
}

/// Check one backend. Failures are captured, never returned.
pub async fn check_backend(transport: &dyn Transport) -> BackendHealth {
    match transport.get(HEALTH_ENDPOINT, None).await {
        Ok(details) => classify(details),
        Err(e) => {
            debug!("Health check failed: {e}");
            BackendHealth::Unhealthy {
                error: e.to_string(),
            }
        }
    }
}

/// Check both backends concurrently.
pub async fn check_system(api: &Arc<dyn Transport>, media: &Arc<dyn Transport>) -> SystemHealth {
    let (node, python) = futures::join!(check_backend(api.as_ref()), check_backend(media.as_ref()));
    SystemHealth {
        node,
        python,
        timestamp: Utc::now(),
    }
}
