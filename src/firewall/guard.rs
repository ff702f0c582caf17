// src/firewall/guard.rs - bounded collaborator calls
use axum::http::StatusCode;
use std::future::Future;
use std::time::Duration;

use super::verdict::{LayerId, Reason, Verdict};
use crate::config::FailPolicy;
use crate::storage::StoreError;

/// Runs a collaborator call under `timeout`. On error or timeout the caller gets the
/// verdict its fail policy dictates and should return it as-is.
pub async fn guarded<T, F>(layer: LayerId, policy: FailPolicy, timeout: Duration, call: F) -> Result<T, Verdict>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let failure = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {}ms", timeout.as_millis()),
    };
    Err(failure_verdict(layer, policy, &failure))
}

pub fn failure_verdict(layer: LayerId, policy: FailPolicy, failure: &str) -> Verdict {
    match policy {
        FailPolicy::Closed => {
            tracing::error!(layer = %layer, "Collaborator failed, denying request: {}", failure);
            Verdict::deny(
                layer,
                Reason::LayerError,
                StatusCode::FORBIDDEN,
                "Request could not be verified",
            )
        }
        FailPolicy::Open => {
            tracing::warn!(layer = %layer, "Collaborator failed, allowing request: {}", failure);
            Verdict::allow_because(layer, Reason::LayerError)
        }
    }
}
