//! Deadline wrapper for remote calls.
//!
//! `run_with_timeout` races an operation against a timer. When the timer wins,
//! the operation future is dropped and its eventual result is discarded; the
//! request it started may still complete on the remote side. No retries happen
//! here.

use crate::errors::GuardError;
use std::{future::Future, time::Duration};
use tracing::debug;

/// Run `operation`, failing with [`GuardError::Timeout`] if it has not settled
/// within `duration`. The timer is released as soon as either side settles.
pub async fn run_with_timeout<F, T, E>(
    operation: F,
    duration: Duration,
    label: impl Into<String>,
) -> Result<T, GuardError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result.map_err(GuardError::Operation),
        Err(_elapsed) => {
            let label = label.into();
            debug!("{} exceeded {}ms, discarding result", label, duration.as_millis());
            Err(GuardError::Timeout { label, duration })
        }
    }
}
