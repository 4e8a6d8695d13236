//! Prometheus metrics for cost queries and resource scans
//!
//! Counters are labelled by source or operation name so a failing account
//! shows up without parsing logs.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{Error, Result};

lazy_static! {
    // === Cost Queries ===

    /// Cost queries by source and outcome
    pub static ref COST_QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "cloudcost_cost_queries_total",
        "Total cost queries by source and status",
        &["source", "status"]
    ).unwrap();

    /// Cost query latency per source
    pub static ref COST_QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "cloudcost_cost_query_duration_seconds",
        "Cost query latency in seconds",
        &["source"],
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    ).unwrap();

    /// Windows reported by more than one source
    pub static ref DUPLICATE_WINDOWS_TOTAL: CounterVec = register_counter_vec!(
        "cloudcost_duplicate_windows_total",
        "Duplicate series windows seen while merging sources",
        &["diverged"]
    ).unwrap();

    // === Resource Scans ===

    /// Scan operations by name and outcome
    pub static ref SCAN_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "cloudcost_scan_operations_total",
        "Total resource scan operations by status",
        &["operation", "status"]
    ).unwrap();

    /// Resources collected per operation
    pub static ref SCANNED_RESOURCES_TOTAL: CounterVec = register_counter_vec!(
        "cloudcost_scanned_resources_total",
        "Total resources collected by scan operation",
        &["operation"]
    ).unwrap();
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Serialization(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| Error::Serialization(format!("Metrics contain invalid UTF-8: {}", e)))
}

/// Record one source's cost query
#[inline]
pub fn record_cost_query(source: &str, duration_secs: f64, success: bool) {
    COST_QUERIES_TOTAL
        .with_label_values(&[source, status(success)])
        .inc();

    COST_QUERY_DURATION
        .with_label_values(&[source])
        .observe(duration_secs);
}

/// Record a duplicate window found during a merge
#[inline]
pub fn record_duplicate_window(diverged: bool) {
    let label = if diverged { "true" } else { "false" };
    DUPLICATE_WINDOWS_TOTAL.with_label_values(&[label]).inc();
}

/// Record one scan operation
#[inline]
pub fn record_scan_operation(operation: &str, resources: usize, success: bool) {
    SCAN_OPERATIONS_TOTAL
        .with_label_values(&[operation, status(success)])
        .inc();

    if resources > 0 {
        SCANNED_RESOURCES_TOTAL
            .with_label_values(&[operation])
            .inc_by(resources as f64);
    }
}
