//! cloudcost - Canonical cost series and resource inventory across cloud accounts
//!
//! This library merges cost data and resource inventories from many
//! provider accounts into one model:
//! - Collision-safe series keys built from tag and dimension group keys
//! - Concurrent fan-out over cost sources with window-level dedup
//! - Concurrent resource scans that keep every success when some fail
//! - Translation between a universal tag vocabulary and provider spellings
//!
//! Provider SDK calls live outside this crate behind the `CostPageSource`,
//! `Coster` and `ResourceScanner` traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod partial;
pub mod types;

/// Universal and provider tag/dimension vocabularies
pub mod normalize;

/// Cost queries: per-source aggregation and multi-source fan-out
pub mod cost;

/// Resource inventory scans
pub mod scan;

/// Provider-type registry building costers and scanners from configuration
pub mod registry;

/// Configuration management with TOML support
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Prometheus metrics
pub mod metrics;

// Re-export main types
pub use config::{Config, Provider};
pub use cost::{CostResult, Coster, MultiCoster, PagedCoster};
pub use error::{Error, JoinedError, Result};
pub use normalize::Vocabulary;
pub use partial::Partial;
pub use registry::{ProviderFactory, ProviderRegistry};
pub use scan::{AccountScanner, MultiScanner, ResourceScanTracker, ResourceScanner, ScanResource, Scanner};
pub use types::{CostQuery, Datapoint, Granularity, GroupKey, GroupKeySet, SeriesKey};
