//! Resource inventory scanning
//!
//! A `ResourceScanner<C>` lists one kind of resource given a provider config
//! `C`. An `AccountScanner<C>` runs all of an account's scanners through the
//! `ResourceScanTracker`, and a `MultiScanner` runs many accounts at once.
//! Every level returns whatever succeeded next to the joined error of what
//! did not.

pub mod resource;
pub mod tracker;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::partial::{acquire_permit, permits, Partial};

pub use resource::{ResourceCategory, ResourceTaxonomy, ScanResource};
pub use tracker::{ResourceScanTracker, ScanOutcome};

/// One resource-listing operation for provider config `C`
#[async_trait]
pub trait ResourceScanner<C>: Send + Sync {
    /// Operation name used in logs, metrics and error context
    fn name(&self) -> &str;

    /// List resources
    async fn scan(&self, cancel: &CancellationToken, config: &C) -> Result<Vec<ScanResource>>;
}

/// Scans a whole account or group of accounts
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Name used in logs and error context
    fn name(&self) -> &str;

    /// Run every scan operation and gather the results
    async fn scan(&self, cancel: &CancellationToken) -> Partial<Vec<ScanResource>>;
}

// ============================================================================
// Account Scanner
// ============================================================================

/// Runs every registered operation against one account's config
pub struct AccountScanner<C> {
    name: String,
    config: Arc<C>,
    operations: Vec<Arc<dyn ResourceScanner<C>>>,
    max_concurrent: usize,
}

impl<C> AccountScanner<C>
where
    C: Send + Sync + 'static,
{
    /// Create a scanner with no operations
    pub fn new(name: impl Into<String>, config: C) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            operations: Vec::new(),
            max_concurrent: 0,
        }
    }

    /// Add an operation
    pub fn with_operation(mut self, operation: Arc<dyn ResourceScanner<C>>) -> Self {
        self.operations.push(operation);
        self
    }

    /// Add an operation
    pub fn register(&mut self, operation: Arc<dyn ResourceScanner<C>>) {
        self.operations.push(operation);
    }

    /// Limit the number of operations running at once (0 = unbounded)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Registered operation names
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Provider config shared by every operation
    pub fn config(&self) -> &C {
        &self.config
    }
}

#[async_trait]
impl<C> Scanner for AccountScanner<C>
where
    C: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, cancel: &CancellationToken) -> Partial<Vec<ScanResource>> {
        let mut tracker =
            ResourceScanTracker::new(cancel.clone()).with_max_concurrent(self.max_concurrent);
        for operation in &self.operations {
            tracker.scan(Arc::clone(&self.config), Arc::clone(operation));
        }

        let outcome = tracker.wait().await;
        info!(
            account = %self.name,
            operations = self.operations.len(),
            resources = outcome.resources.len(),
            failed = outcome.errors.len(),
            "Account scan complete"
        );
        outcome.into_partial()
    }
}

// ============================================================================
// Multi Scanner
// ============================================================================

/// Scans several accounts concurrently and concatenates their resources
#[derive(Clone, Default)]
pub struct MultiScanner {
    scanners: Vec<Arc<dyn Scanner>>,
    max_concurrent: usize,
}

impl MultiScanner {
    /// Create a scanner over the given accounts
    pub fn new(scanners: Vec<Arc<dyn Scanner>>) -> Self {
        Self {
            scanners,
            max_concurrent: 0,
        }
    }

    /// Limit the number of accounts scanned at once (0 = unbounded)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Add an account scanner
    pub fn push(&mut self, scanner: Arc<dyn Scanner>) {
        self.scanners.push(scanner);
    }

    /// Number of account scanners
    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    /// Check if there are no account scanners
    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

impl std::fmt::Debug for MultiScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.scanners.iter().map(|s| s.name()).collect();
        f.debug_struct("MultiScanner")
            .field("scanners", &names)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

#[async_trait]
impl Scanner for MultiScanner {
    fn name(&self) -> &str {
        "multi"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Partial<Vec<ScanResource>> {
        let semaphore = permits(self.max_concurrent);
        let mut join_set = JoinSet::new();

        for scanner in &self.scanners {
            let scanner = Arc::clone(scanner);
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let name = scanner.name().to_string();
                // Accounts observe the token per operation and keep what finished
                let partial = match acquire_permit(&name, &cancel, semaphore).await {
                    Ok(_permit) => Ok(scanner.scan(&cancel).await),
                    Err(e) => Err(e),
                };
                (name, partial)
            });
        }

        let mut resources = Vec::new();
        let mut errors = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(partial))) => {
                    let (found, error) = partial.into_parts();
                    resources.extend(found);
                    if let Some(joined) = error {
                        errors.extend(joined.into_errors().into_iter().map(|e| e.with_source(&name)));
                    }
                }
                Ok((name, Err(e))) => {
                    warn!(account = %name, error = %e, "Account scan failed");
                    errors.push(e.with_source(&name));
                }
                Err(e) => {
                    warn!(error = %e, "Account scan task failed");
                    errors.push(Error::TaskFailed {
                        operation: "account scan".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            accounts = self.scanners.len(),
            resources = resources.len(),
            failed = errors.len(),
            "Multi-account scan complete"
        );
        Partial::new(resources, errors)
    }
}
