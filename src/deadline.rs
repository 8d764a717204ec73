//! Bounded I/O
//!
//! Every storage and transport call is raced against a timeout and a
//! cancellation token, so a hung backend stalls one flow for a bounded
//! time and an abandoned flow stops at its next I/O boundary.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a bounded call did not produce its own result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Interrupted {
    #[error("{0} timed out after {1:?}")]
    TimedOut(&'static str, Duration),

    #[error("{0} cancelled")]
    Cancelled(&'static str),
}

/// Run `fut`, giving up after `limit` or when `cancel` fires
pub async fn bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, Interrupted>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled(operation)),
        result = tokio::time::timeout(limit, fut) => {
            result.map_err(|_| Interrupted::TimedOut(operation, limit))
        }
    }
}
