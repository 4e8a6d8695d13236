//! Result Aggregator
//!
//! Folds one source's raw, possibly multi-page, provider results into a
//! `CostResult`.
//!
//! # Algorithm
//!
//! ```text
//! for each result window (page order):
//!     parse start/end with the provider date format   -- fatal on failure
//!     for each group:
//!         sort raw keys
//!         key contains delimiter  -> Tag(to_universal(key), value)
//!         key without delimiter   -> Dimension(group_by[i] or "dimension-<i>", key)
//!         for each metric: append Datapoint under SeriesKey(group keys, metric)
//! ```
//!
//! Points are appended in ingestion order. Callers that need time order call
//! `CostResult::sort_points` afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::result::CostResult;
use crate::error::{Error, Result};
use crate::normalize::Vocabulary;
use crate::types::{CostGroupIdentifiers, Datapoint, GroupKey, GroupKeySet};

/// One metric amount as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetricValue {
    /// Decimal amount; required
    pub amount: Option<String>,
    /// Unit code; empty when absent
    pub unit: Option<String>,
}

impl RawMetricValue {
    /// Create a metric value
    pub fn new(amount: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            amount: Some(amount.into()),
            unit: Some(unit.into()),
        }
    }
}

/// One group of a result window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGroup {
    /// Provider group keys, one per group-by axis
    pub keys: Vec<String>,
    /// Metric name to amount
    pub metrics: BTreeMap<String, RawMetricValue>,
}

/// One time window of a provider result page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResultWindow {
    /// Window start in provider date format
    pub start: Option<String>,
    /// Window end (exclusive) in provider date format
    pub end: Option<String>,
    /// Grouped amounts
    #[serde(default)]
    pub groups: Vec<RawGroup>,
    /// Ungrouped totals, reported when the query has no group-by
    #[serde(default)]
    pub total: BTreeMap<String, RawMetricValue>,
}

impl RawResultWindow {
    /// Create an empty window
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
            groups: Vec::new(),
            total: BTreeMap::new(),
        }
    }

    /// Add a group with a single metric
    pub fn with_group<K, S>(mut self, keys: K, metric: &str, value: RawMetricValue) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut metrics = BTreeMap::new();
        metrics.insert(metric.to_string(), value);
        self.groups.push(RawGroup {
            keys: keys.into_iter().map(Into::into).collect(),
            metrics,
        });
        self
    }

    /// Add an ungrouped total
    pub fn with_total(mut self, metric: &str, value: RawMetricValue) -> Self {
        self.total.insert(metric.to_string(), value);
        self
    }
}

/// Counters for one aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Windows folded
    pub windows: usize,
    /// Datapoints added
    pub points: usize,
}

/// Folds provider result windows into a `CostResult`
pub struct CostResultAggregator<'v> {
    vocabulary: &'v Vocabulary,
    group_by: CostGroupIdentifiers,
    date_format: String,
    result: CostResult,
    stats: AggregatorStats,
}

impl<'v> CostResultAggregator<'v> {
    /// Create an aggregator for a query's group-by specification
    ///
    /// The specification is de-duplicated the same way the native query was.
    pub fn new(vocabulary: &'v Vocabulary, group_by: &CostGroupIdentifiers) -> Self {
        Self {
            vocabulary,
            group_by: group_by.unique(),
            date_format: vocabulary.date_format().to_string(),
            result: CostResult::new(),
            stats: AggregatorStats::default(),
        }
    }

    /// Override the date format used to parse window bounds
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Fold one page of result windows
    ///
    /// Every window's bounds are parsed before anything is added, so a page
    /// that fails leaves the result untouched.
    pub fn add_results(&mut self, windows: &[RawResultWindow]) -> Result<()> {
        let bounds = windows
            .iter()
            .map(|w| self.parse_window(w))
            .collect::<Result<Vec<_>>>()?;

        // Validate amounts before mutating for the same reason
        for window in windows {
            for group in &window.groups {
                check_metrics(&group.metrics)?;
            }
            check_metrics(&window.total)?;
        }

        for (window, (start, end)) in windows.iter().zip(bounds) {
            if window.groups.is_empty() {
                let keys = GroupKeySet::new();
                self.add_metrics(&keys, &window.total, start, end)?;
            }
            for group in &window.groups {
                let keys = self.parse_group_keys(&group.keys);
                self.add_metrics(&keys, &group.metrics, start, end)?;
            }
            self.stats.windows += 1;
        }
        Ok(())
    }

    /// Counters so far
    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Result built so far
    pub fn result(&self) -> &CostResult {
        &self.result
    }

    /// Finish and take the result
    pub fn into_result(self) -> CostResult {
        self.result
    }

    fn add_metrics(
        &mut self,
        keys: &GroupKeySet,
        metrics: &BTreeMap<String, RawMetricValue>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        for (metric_name, value) in metrics {
            let amount = value.amount.clone().unwrap_or_default();
            let unit = value.unit.clone().unwrap_or_default();
            let point = Datapoint::new(start, end, unit, amount)?;
            self.result.add_datapoint(metric_name, keys, point);
            self.stats.points += 1;
        }
        Ok(())
    }

    fn parse_window(&self, window: &RawResultWindow) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (raw_start, raw_end) = match (&window.start, &window.end) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(Error::MalformedData(
                    "missing time period in results".to_string(),
                ))
            }
        };

        let start = parse_bound(raw_start, &self.date_format).map_err(|e| {
            Error::MalformedData(format!("invalid start time in results {:?}: {}", raw_start, e))
        })?;
        let end = parse_bound(raw_end, &self.date_format).map_err(|e| {
            Error::MalformedData(format!("invalid end time in results {:?}: {}", raw_end, e))
        })?;

        if start > end {
            return Err(Error::MalformedData(format!(
                "window start {:?} is after end {:?}",
                raw_start, raw_end
            )));
        }
        Ok((start, end))
    }

    fn parse_group_keys(&self, raw_keys: &[String]) -> GroupKeySet {
        let mut keys: Vec<&str> = raw_keys.iter().map(String::as_str).collect();
        keys.sort_unstable();

        keys.into_iter()
            .enumerate()
            .map(|(i, raw)| match self.vocabulary.split_group_key(raw) {
                Some((key, value)) => GroupKey::tag(self.vocabulary.to_universal_tag(key), value),
                None => GroupKey::dimension(self.positional_dimension(i), raw),
            })
            .collect()
    }

    /// Name for an undelimited key at `index`
    ///
    /// Relies on the provider returning keys in group-by order.
    fn positional_dimension(&self, index: usize) -> String {
        match self.group_by.get(index) {
            Some(group) if !group.dimension.is_empty() => group.dimension.clone(),
            _ => format!("dimension-{}", index),
        }
    }
}

fn check_metrics(metrics: &BTreeMap<String, RawMetricValue>) -> Result<()> {
    for (name, value) in metrics {
        if value.amount.is_none() {
            return Err(Error::MalformedData(format!(
                "missing amount for metric {:?}",
                name
            )));
        }
    }
    Ok(())
}

/// Parse a window bound as a datetime or date in `format`, else RFC 3339
///
/// The datetime form is tried first: a date parse would accept an hourly
/// bound and drop its time.
fn parse_bound(raw: &str, format: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(at.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
}
