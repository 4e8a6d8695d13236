//! Multi-Source Cost Fan-Out
//!
//! Sends one `CostQuery` to every registered `Coster` at once and merges the
//! per-source results as they complete. The gather loop is the only owner of
//! the merged `CostResult`; workers hand their results back through the
//! `JoinSet` and never touch shared state.
//!
//! Merging is keyed on series identity and window. When two sources report
//! the same window for the same series only the first to arrive is kept. If
//! their values differ a warning is logged and
//! `cloudcost_duplicate_windows_total{diverged="true"}` is incremented.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cost::result::{CostResult, MergeOutcome, WindowMerger};
use crate::cost::Coster;
use crate::error::{Error, Result};
use crate::metrics;
use crate::partial::{permits, run_worker, Partial};
use crate::types::CostQuery;

/// Fans a cost query out to several sources
#[derive(Clone, Default)]
pub struct MultiCoster {
    costers: Vec<Arc<dyn Coster>>,
    max_concurrent: usize,
}

impl MultiCoster {
    /// Create a fan-out over the given sources
    pub fn new(costers: Vec<Arc<dyn Coster>>) -> Self {
        Self {
            costers,
            max_concurrent: 0,
        }
    }

    /// Limit the number of in-flight source queries (0 = unbounded)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Add a source
    pub fn push(&mut self, coster: Arc<dyn Coster>) {
        self.costers.push(coster);
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.costers.len()
    }

    /// Check if there are no sources
    pub fn is_empty(&self) -> bool {
        self.costers.is_empty()
    }

    /// Source names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.costers.iter().map(|c| c.name()).collect()
    }

    /// Query every source concurrently and merge the results
    ///
    /// Waits for all sources. Failed sources contribute one error each to the
    /// joined error and nothing to the result. When every source fails the
    /// result is empty, never absent.
    pub async fn get_costs(
        &self,
        cancel: &CancellationToken,
        query: &CostQuery,
    ) -> Partial<CostResult> {
        if let Err(e) = query.validate() {
            return Partial::new(CostResult::new(), vec![e]);
        }

        let semaphore = permits(self.max_concurrent);
        let mut join_set = JoinSet::new();

        for coster in &self.costers {
            let coster = Arc::clone(coster);
            let cancel = cancel.clone();
            let query = query.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let name = coster.name().to_string();
                let started = Instant::now();
                debug!(source = %name, "Querying cost source");

                let result =
                    run_worker(&name, &cancel, semaphore, coster.get_costs(&cancel, &query)).await;
                (name, started.elapsed(), result)
            });
        }

        let mut merger = WindowMerger::new();
        let mut errors = Vec::new();
        let mut succeeded = 0usize;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, elapsed, result)) => {
                    match self.gather_one(&mut merger, &name, elapsed, result) {
                        Ok(()) => succeeded += 1,
                        Err(e) => errors.push(e),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Cost source task failed");
                    errors.push(Error::TaskFailed {
                        operation: "cost source".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Completion order decides point order inside a series; sort so the
        // output does not depend on it.
        let mut merged = merger.into_result();
        merged.sort_points();

        info!(
            sources = self.costers.len(),
            succeeded = succeeded,
            failed = errors.len(),
            series = merged.series_count(),
            points = merged.point_count(),
            "Cost fan-out complete"
        );

        Partial::new(merged, errors)
    }

    fn gather_one(
        &self,
        merger: &mut WindowMerger,
        name: &str,
        elapsed: Duration,
        result: Result<CostResult>,
    ) -> Result<()> {
        match result {
            Ok(result) => {
                metrics::record_cost_query(name, elapsed.as_secs_f64(), true);
                debug!(
                    source = %name,
                    series = result.series_count(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Cost source finished"
                );
                merge_source(merger, name, result);
                Ok(())
            }
            Err(e) => {
                metrics::record_cost_query(name, elapsed.as_secs_f64(), false);
                warn!(source = %name, error = %e, "Cost source failed");
                Err(e.with_source(name))
            }
        }
    }
}

impl std::fmt::Debug for MultiCoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiCoster")
            .field("costers", &self.names())
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

/// Merge one source's result into the accumulator with window dedup
fn merge_source(merger: &mut WindowMerger, name: &str, result: CostResult) {
    for (key, series) in result.series {
        for point in series.points {
            let (start, end) = point.window();
            let value = point.value.clone();

            match merger.merge_datapoint(&series.metric_name, &series.group_keys, point) {
                MergeOutcome::Inserted => {}
                MergeOutcome::Duplicate => metrics::record_duplicate_window(false),
                MergeOutcome::Diverged => {
                    metrics::record_duplicate_window(true);
                    let kept = merger
                        .point_at(&key, start, end)
                        .map(|p| p.value.clone())
                        .unwrap_or_default();
                    warn!(
                        source = %name,
                        series = %key,
                        start = %start,
                        end = %end,
                        kept = %kept,
                        discarded = %value,
                        "Sources disagree on a cost window; keeping the first value"
                    );
                }
            }
        }
    }
}
