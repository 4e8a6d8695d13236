//! Partial-success results for scatter-gather operations
//!
//! Every fan-out in this crate favours partial success over an all-or-nothing
//! outcome. A `Partial<T>` always carries a value (possibly empty) next to the
//! joined error of the workers that failed, so callers can inspect both.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, JoinedError, Result};

/// Gathered value plus the joined error of any failed workers
#[derive(Debug)]
pub struct Partial<T> {
    /// Everything that succeeded
    pub value: T,

    /// Joined failures, `None` when every worker succeeded
    pub error: Option<JoinedError>,
}

impl<T> Partial<T> {
    /// Create from a value and the list of failures
    pub fn new(value: T, errors: Vec<Error>) -> Self {
        Self {
            value,
            error: JoinedError::join(errors),
        }
    }

    /// Create a fully successful result
    pub fn complete(value: T) -> Self {
        Self { value, error: None }
    }

    /// True when no worker failed
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Number of failed workers
    pub fn failure_count(&self) -> usize {
        self.error.as_ref().map_or(0, JoinedError::len)
    }

    /// Split into the value and the optional joined error
    pub fn into_parts(self) -> (T, Option<JoinedError>) {
        (self.value, self.error)
    }

    /// Discard partial data when any worker failed
    pub fn into_result(self) -> Result<T> {
        match self.error {
            None => Ok(self.value),
            Some(joined) => Err(Error::Joined(joined)),
        }
    }

    /// Map the value, keeping the error untouched
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Partial<U> {
        Partial {
            value: f(self.value),
            error: self.error,
        }
    }
}

// ============================================================================
// Worker Execution
// ============================================================================

/// Semaphore bounding in-flight workers, `None` when `limit` is 0
pub(crate) fn permits(limit: usize) -> Option<Arc<Semaphore>> {
    (limit > 0).then(|| Arc::new(Semaphore::new(limit)))
}

/// Wait for a worker slot, giving up when `cancel` fires
///
/// A token that has already fired fails without touching the semaphore.
pub(crate) async fn acquire_permit(
    operation: &str,
    cancel: &CancellationToken,
    permits: Option<Arc<Semaphore>>,
) -> Result<Option<OwnedSemaphorePermit>> {
    if cancel.is_cancelled() {
        return Err(Error::cancelled(operation));
    }
    let Some(semaphore) = permits else {
        return Ok(None);
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        permit = semaphore.acquire_owned() => permit.map(Some).map_err(|e| Error::TaskFailed {
            operation: operation.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Drive one worker to completion or cancellation
///
/// Cancellation is checked first, so a token that has already fired never
/// starts the work. Waiting for a permit is cancellable too.
pub(crate) async fn run_worker<T, F>(
    operation: &str,
    cancel: &CancellationToken,
    permits: Option<Arc<Semaphore>>,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let _permit = acquire_permit(operation, cancel, permits).await?;

    let guarded = async {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::TaskFailed {
                operation: operation.to_string(),
                message: panic_message(panic),
            }),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = guarded => result,
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
