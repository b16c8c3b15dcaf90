//! Bounded calls to external collaborators
//!
//! Every call to the VCS host, a scanner or a notification channel runs
//! exactly once under a timeout. There are no retries: read paths degrade to
//! a safe default via [`call_or_default`], the merge path surfaces the error
//! via [`call`].

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, SecurityGateError};

/// Run `fut` once, failing with `ExternalCallTimeout` when it exceeds `timeout`.
pub async fn call<T, F>(collaborator: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SecurityGateError::ExternalCallTimeout {
            collaborator: collaborator.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Run `fut` once and fall back to `default` on failure or timeout.
///
/// Returns the value together with the error that caused the fallback, so
/// callers can record reduced confidence instead of treating it as success.
pub async fn call_or_default<T, F>(
    collaborator: &str,
    timeout: Duration,
    fut: F,
    default: T,
) -> (T, Option<SecurityGateError>)
where
    F: Future<Output = Result<T>>,
{
    match call(collaborator, timeout, fut).await {
        Ok(value) => (value, None),
        Err(e) => {
            warn!("External call to {} failed, using safe default: {}", collaborator, e);
            (default, Some(e))
        }
    }
}
