//! Canonical cost query result
//!
//! A `CostResult` maps each `SeriesKey` to its `CostSeries`. It is created
//! empty per query, filled by the aggregator (per source) or the fan-out
//! (across sources), and handed to the caller once the gather completes.
//!
//! Two insertion paths exist:
//!
//! - `add_datapoint` appends unconditionally. The aggregator uses it while
//!   folding the pages of one source, where every window is new.
//! - `merge_datapoint` skips a point whose `(start, end)` window already exists
//!   in the series. It scans the series, so bulk merges go through
//!   `WindowMerger`, which indexes windows and keeps the fan-out linear.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CostSeries, Datapoint, GroupKeySet, SeriesKey};

/// Outcome of merging one datapoint into a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The window was new and the point was added
    Inserted,
    /// The window already existed with the same unit and value
    Duplicate,
    /// The window already existed with a different unit or value; the
    /// existing point was kept
    Diverged,
}

/// Mapping from series key to series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostResult {
    /// Series keyed by canonical identity
    pub series: BTreeMap<SeriesKey, CostSeries>,
}

impl CostResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self {
            series: BTreeMap::new(),
        }
    }

    /// Append a datapoint to its series, creating the series if absent
    pub fn add_datapoint(&mut self, metric_name: &str, group_keys: &GroupKeySet, point: Datapoint) {
        self.series_entry(metric_name, group_keys).points.push(point);
    }

    /// Add a datapoint unless its window is already present in the series
    ///
    /// When the window exists the existing point is kept. A differing unit or
    /// value is reported as `MergeOutcome::Diverged` so the caller can flag it.
    pub fn merge_datapoint(
        &mut self,
        metric_name: &str,
        group_keys: &GroupKeySet,
        point: Datapoint,
    ) -> MergeOutcome {
        let series = self.series_entry(metric_name, group_keys);

        let same_as_existing = series
            .point_at(point.start, point.end)
            .map(|existing| existing.value == point.value && existing.unit == point.unit);

        match same_as_existing {
            Some(true) => MergeOutcome::Duplicate,
            Some(false) => MergeOutcome::Diverged,
            None => {
                series.points.push(point);
                MergeOutcome::Inserted
            }
        }
    }

    /// Merge every point of `other` into this result with window dedup
    ///
    /// Returns the number of diverged windows encountered.
    pub fn merge(&mut self, other: &CostResult) -> usize {
        let mut merger = WindowMerger::from(std::mem::take(self));
        let mut diverged = 0;
        for series in other.series.values() {
            for point in &series.points {
                let outcome =
                    merger.merge_datapoint(&series.metric_name, &series.group_keys, point.clone());
                if outcome == MergeOutcome::Diverged {
                    diverged += 1;
                }
            }
        }
        *self = merger.into_result();
        diverged
    }

    /// Look up a series
    pub fn get(&self, key: &SeriesKey) -> Option<&CostSeries> {
        self.series.get(key)
    }

    /// Look up a series by group keys and metric
    pub fn find(&self, group_keys: &GroupKeySet, metric_name: &str) -> Option<&CostSeries> {
        self.series.get(&SeriesKey::new(group_keys, metric_name))
    }

    /// Number of series
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Total number of datapoints across all series
    pub fn point_count(&self) -> usize {
        self.series.values().map(|s| s.points.len()).sum()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Sort every series by window start, then end
    ///
    /// Points are kept in ingestion order otherwise.
    pub fn sort_points(&mut self) {
        for series in self.series.values_mut() {
            series.points.sort_by_key(|p| (p.start, p.end));
        }
    }

    fn series_entry(&mut self, metric_name: &str, group_keys: &GroupKeySet) -> &mut CostSeries {
        self.series
            .entry(SeriesKey::new(group_keys, metric_name))
            .or_insert_with(|| CostSeries::new(metric_name, group_keys.clone()))
    }
}

// ============================================================================
// Indexed Merge
// ============================================================================

type Window = (DateTime<Utc>, DateTime<Utc>);

/// A `CostResult` under construction with an index of its windows
///
/// Each series maps `(start, end)` to the position of its point, so a merge
/// is a hash lookup instead of a scan. Positions stay valid because points
/// are only appended until `into_result`.
#[derive(Debug, Default)]
pub struct WindowMerger {
    result: CostResult,
    windows: HashMap<SeriesKey, HashMap<Window, usize>>,
}

impl WindowMerger {
    /// Start from an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Same semantics as `CostResult::merge_datapoint`
    pub fn merge_datapoint(
        &mut self,
        metric_name: &str,
        group_keys: &GroupKeySet,
        point: Datapoint,
    ) -> MergeOutcome {
        let key = SeriesKey::new(group_keys, metric_name);
        let windows = self.windows.entry(key.clone()).or_default();
        let series = self
            .result
            .series
            .entry(key)
            .or_insert_with(|| CostSeries::new(metric_name, group_keys.clone()));

        match windows.get(&point.window()) {
            Some(&position) => {
                let existing = &series.points[position];
                if existing.value == point.value && existing.unit == point.unit {
                    MergeOutcome::Duplicate
                } else {
                    MergeOutcome::Diverged
                }
            }
            None => {
                windows.insert(point.window(), series.points.len());
                series.points.push(point);
                MergeOutcome::Inserted
            }
        }
    }

    /// The point already holding this window
    pub fn point_at(&self, key: &SeriesKey, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&Datapoint> {
        let position = *self.windows.get(key)?.get(&(start, end))?;
        self.result.series.get(key)?.points.get(position)
    }

    /// Result merged so far
    pub fn result(&self) -> &CostResult {
        &self.result
    }

    /// Finish merging
    pub fn into_result(self) -> CostResult {
        self.result
    }
}

impl From<CostResult> for WindowMerger {
    /// Index an existing result; the first point of a repeated window wins
    fn from(result: CostResult) -> Self {
        let windows = result
            .series
            .iter()
            .map(|(key, series)| {
                let mut positions = HashMap::with_capacity(series.points.len());
                for (position, point) in series.points.iter().enumerate() {
                    positions.entry(point.window()).or_insert(position);
                }
                (key.clone(), positions)
            })
            .collect();
        Self { result, windows }
    }
}
