//! Concurrent Resource Scan Tracker
//!
//! Runs independent resource-listing operations against one account and
//! collects everything they return. Each operation runs in its own task. A
//! failing operation records its error and the others carry on.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tracker = ResourceScanTracker::new(cancel.clone());
//! tracker.scan(Arc::clone(&config), buckets);
//! tracker.scan(Arc::clone(&config), clusters);
//! let outcome = tracker.wait().await;
//! ```
//!
//! Resources and errors are accumulated behind one mutex each. Resources
//! carry no ordering guarantee across operations; errors are kept in the
//! order operations finished.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::partial::{permits, run_worker, Partial};
use crate::scan::resource::ScanResource;
use crate::scan::ResourceScanner;

/// Everything collected by one scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Resources from every successful operation
    pub resources: Vec<ScanResource>,
    /// One entry per failed operation, in completion order
    pub errors: Vec<Error>,
}

impl ScanOutcome {
    /// Convert into a value plus joined error
    pub fn into_partial(self) -> Partial<Vec<ScanResource>> {
        Partial::new(self.resources, self.errors)
    }
}

/// Tracks concurrently running scan operations
///
/// Operations start as soon as they are registered, so the tracker must be
/// used from within a tokio runtime.
pub struct ResourceScanTracker {
    resources: Arc<Mutex<Vec<ScanResource>>>,
    errors: Arc<Mutex<Vec<Error>>>,
    join_set: JoinSet<()>,
    cancel: CancellationToken,
    permits: Option<Arc<Semaphore>>,
    registered: usize,
}

impl ResourceScanTracker {
    /// Create a tracker whose operations observe `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            resources: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
            join_set: JoinSet::new(),
            cancel,
            permits: None,
            registered: 0,
        }
    }

    /// Limit the number of operations running at once (0 = unbounded)
    ///
    /// Must be set before any operation is registered.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.permits = permits(max_concurrent);
        self
    }

    /// Number of operations registered so far
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Register and start an operation
    ///
    /// `operation_fn` receives the tracker's cancellation token and returns
    /// the future that lists resources.
    pub fn spawn<F, Fut>(&mut self, operation: impl Into<String>, operation_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<ScanResource>>> + Send + 'static,
    {
        let operation = operation.into();
        let cancel = self.cancel.clone();
        let permits = self.permits.clone();
        let resources = Arc::clone(&self.resources);
        let errors = Arc::clone(&self.errors);
        let work = operation_fn(cancel.clone());

        self.registered += 1;
        self.join_set.spawn(async move {
            debug!(operation = %operation, "Starting scan operation");

            match run_worker(&operation, &cancel, permits, work).await {
                Ok(found) => {
                    metrics::record_scan_operation(&operation, found.len(), true);
                    debug!(operation = %operation, resources = found.len(), "Scan operation finished");
                    resources.lock().extend(found);
                }
                Err(e) => {
                    metrics::record_scan_operation(&operation, 0, false);
                    warn!(operation = %operation, error = %e, "Scan operation failed");
                    errors.lock().push(e.with_source(&operation));
                }
            }
        });
    }

    /// Register a `ResourceScanner` against a shared provider config
    pub fn scan<C>(&mut self, config: Arc<C>, scanner: Arc<dyn ResourceScanner<C>>)
    where
        C: Send + Sync + 'static,
    {
        let name = scanner.name().to_string();
        self.spawn(name, move |cancel| async move {
            scanner.scan(&cancel, &config).await
        });
    }

    /// Wait for every registered operation to finish
    pub async fn wait(mut self) -> ScanOutcome {
        while let Some(joined) = self.join_set.join_next().await {
            // Workers catch their own panics; this only sees aborted tasks
            if let Err(e) = joined {
                warn!(error = %e, "Scan task failed");
                self.errors.lock().push(Error::TaskFailed {
                    operation: "scan operation".to_string(),
                    message: e.to_string(),
                });
            }
        }

        let resources = std::mem::take(&mut *self.resources.lock());
        let errors = std::mem::take(&mut *self.errors.lock());

        debug!(
            operations = self.registered,
            resources = resources.len(),
            failed = errors.len(),
            "Scan complete"
        );

        ScanOutcome { resources, errors }
    }
}
