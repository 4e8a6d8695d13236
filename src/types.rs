//! Core data types used throughout the aggregation layer
//!
//! This module defines the canonical cost model shared by every provider:
//!
//! # Key Types
//!
//! - **`GroupKey`**: One grouping axis of a datapoint (a tag or a named dimension)
//! - **`GroupKeySet`**: Ordered grouping signature of a series
//! - **`SeriesKey`**: Canonical merge key of a series (group keys + metric name)
//! - **`Datapoint`**: One time-bounded cost observation
//! - **`CostSeries`**: Ordered datapoints sharing one `SeriesKey`
//! - **`CostQuery`**: Time window, granularity, filters and grouping in universal vocabulary
//!
//! # Example
//!
//! ```rust
//! use cloudcost::types::{GroupKey, GroupKeySet, SeriesKey};
//!
//! let keys = GroupKeySet::from(vec![
//!     GroupKey::tag("stack", "core"),
//!     GroupKey::dimension("account", "123"),
//! ]);
//! assert_eq!(keys.encode(), "stack$core;account$123");
//!
//! let series = SeriesKey::new(&keys, "UnblendedCost");
//! assert_eq!(series.as_str(), "stack$core;account$123:UnblendedCost");
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between a key and its value in an encoded group key
///
/// `$` is outside the tag, label and dimension alphabets of every supported
/// provider. A new provider must be checked against this before use.
pub const KEY_VALUE_DELIMITER: char = '$';

/// Separator between encoded group keys in a series signature
pub const GROUP_DELIMITER: char = ';';

/// Separator between the group signature and the metric name
pub const METRIC_DELIMITER: char = ':';

// ============================================================================
// Group Keys
// ============================================================================

/// One grouping axis of a cost datapoint
///
/// A key is either a tag (`tag_key`, `value`) or a named dimension
/// (`name`, `value`), never both. An empty value is a valid grouping value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GroupKey {
    /// Resource tag or label
    Tag {
        /// Tag key in universal vocabulary
        #[serde(rename = "tagKey")]
        tag_key: String,
        /// Tag value (may be empty)
        value: String,
    },

    /// Provider billing dimension (account, service, region...)
    Dimension {
        /// Dimension name in universal vocabulary
        name: String,
        /// Dimension value (may be empty)
        value: String,
    },
}

impl GroupKey {
    /// Create a tag group key
    pub fn tag(tag_key: impl Into<String>, value: impl Into<String>) -> Self {
        GroupKey::Tag {
            tag_key: tag_key.into(),
            value: value.into(),
        }
    }

    /// Create a named-dimension group key
    pub fn dimension(name: impl Into<String>, value: impl Into<String>) -> Self {
        GroupKey::Dimension {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The tag key or dimension name
    pub fn key(&self) -> &str {
        match self {
            GroupKey::Tag { tag_key, .. } => tag_key,
            GroupKey::Dimension { name, .. } => name,
        }
    }

    /// The grouping value
    pub fn value(&self) -> &str {
        match self {
            GroupKey::Tag { value, .. } | GroupKey::Dimension { value, .. } => value,
        }
    }

    /// Check if this is a tag key
    pub fn is_tag(&self) -> bool {
        matches!(self, GroupKey::Tag { .. })
    }

    /// Encode as `<key>$<value>`
    ///
    /// The kind is not part of the encoding: a tag and a dimension with the
    /// same key and value land in the same series.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cloudcost::types::GroupKey;
    ///
    /// assert_eq!(GroupKey::tag("a", "b").encode(), "a$b");
    /// assert_eq!(GroupKey::dimension("account", "").encode(), "account$");
    /// ```
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.key().len() + self.value().len() + 1);
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut String) {
        out.push_str(self.key());
        out.push(KEY_VALUE_DELIMITER);
        out.push_str(self.value());
    }
}

/// Ordered grouping signature of one series
///
/// Order is part of the identity: the same keys in a different order
/// encode differently and are a different series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKeySet(Vec<GroupKey>);

impl GroupKeySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a key
    pub fn push(&mut self, key: GroupKey) {
        self.0.push(key);
    }

    /// Keys as a slice
    pub fn keys(&self) -> &[GroupKey] {
        &self.0
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys in order
    pub fn iter(&self) -> impl Iterator<Item = &GroupKey> {
        self.0.iter()
    }

    /// Join each key's encoding with `;`, preserving order
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(GROUP_DELIMITER);
            }
            key.encode_into(&mut out);
        }
        out
    }
}

impl From<Vec<GroupKey>> for GroupKeySet {
    fn from(keys: Vec<GroupKey>) -> Self {
        Self(keys)
    }
}

impl FromIterator<GroupKey> for GroupKeySet {
    fn from_iter<I: IntoIterator<Item = GroupKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Series Identity
// ============================================================================

/// Canonical merge key of a cost series
///
/// `<encoded group keys>:<metric name>`. Two datapoints with the same key
/// belong to the same series and are merged, never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Build the key for a metric under a grouping signature
    pub fn new(group_keys: &GroupKeySet, metric_name: &str) -> Self {
        let mut key = group_keys.encode();
        key.push(METRIC_DELIMITER);
        key.push_str(metric_name);
        Self(key)
    }

    /// The encoded key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Datapoints and Series
// ============================================================================

/// One cost observation over `[start, end)`
///
/// `value` stays a decimal string exactly as the provider reported it so that
/// financial amounts never pass through a float.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,

    /// Window end (exclusive)
    pub end: DateTime<Utc>,

    /// Currency or unit code, e.g. "USD"
    pub unit: String,

    /// Decimal amount as reported
    pub value: String,
}

impl Datapoint {
    /// Create a datapoint, rejecting windows where `start > end`
    ///
    /// # Example
    ///
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use cloudcost::types::Datapoint;
    ///
    /// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    /// let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    ///
    /// let point = Datapoint::new(start, end, "USD", "100.00").unwrap();
    /// assert_eq!(point.window(), (start, end));
    ///
    /// assert!(Datapoint::new(end, start, "USD", "1").is_err());
    /// ```
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        if start > end {
            return Err(Error::MalformedData(format!(
                "invalid window: start {} > end {}",
                start, end
            )));
        }
        Ok(Self {
            start,
            end,
            unit: unit.into(),
            value: value.into(),
        })
    }

    /// The `(start, end)` pair that identifies this point within a series
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start, self.end)
    }
}

/// Ordered datapoints for one metric under one grouping signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSeries {
    /// Provider metric name, e.g. "UnblendedCost"
    pub metric_name: String,

    /// Grouping signature
    pub group_keys: GroupKeySet,

    /// Points in ingestion order
    pub points: Vec<Datapoint>,
}

impl CostSeries {
    /// Create an empty series
    pub fn new(metric_name: impl Into<String>, group_keys: GroupKeySet) -> Self {
        Self {
            metric_name: metric_name.into(),
            group_keys,
            points: Vec::new(),
        }
    }

    /// Canonical key of this series
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.group_keys, &self.metric_name)
    }

    /// Find the point covering exactly this window
    pub fn point_at(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&Datapoint> {
        self.points.iter().find(|p| p.start == start && p.end == end)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Time-bucket size of returned datapoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One point per hour
    Hourly,
    /// One point per day
    #[default]
    Daily,
    /// One point per month
    Monthly,
}

impl Granularity {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(Error::Configuration(format!(
                "unknown granularity '{}', expected hourly, daily or monthly",
                other
            ))),
        }
    }
}

/// Restrict costs to resources carrying one of `values` under tag `key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostFilterTag {
    /// Tag key in universal vocabulary
    pub key: String,
    /// Accepted values
    pub values: Vec<String>,
}

impl CostFilterTag {
    /// Create a filter
    pub fn new<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// One group-by axis of a query: a tag key or a dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostGroupIdentifier {
    /// Tag key in universal vocabulary
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag_key: String,

    /// Dimension name in universal vocabulary
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dimension: String,
}

impl CostGroupIdentifier {
    /// Group by a tag
    pub fn tag(tag_key: impl Into<String>) -> Self {
        Self {
            tag_key: tag_key.into(),
            dimension: String::new(),
        }
    }

    /// Group by a dimension
    pub fn dimension(dimension: impl Into<String>) -> Self {
        Self {
            tag_key: String::new(),
            dimension: dimension.into(),
        }
    }
}

/// Ordered group-by specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostGroupIdentifiers(pub Vec<CostGroupIdentifier>);

impl CostGroupIdentifiers {
    /// Drop repeated tag keys and dimensions, keeping first occurrences
    ///
    /// Identifiers with neither a tag key nor a dimension are dropped too.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cloudcost::types::{CostGroupIdentifier, CostGroupIdentifiers};
    ///
    /// let groups = CostGroupIdentifiers(vec![
    ///     CostGroupIdentifier::tag("env"),
    ///     CostGroupIdentifier::dimension("account"),
    ///     CostGroupIdentifier::tag("env"),
    ///     CostGroupIdentifier::default(),
    /// ]);
    /// assert_eq!(groups.unique().len(), 2);
    /// ```
    pub fn unique(&self) -> CostGroupIdentifiers {
        let mut seen_tags = std::collections::HashSet::new();
        let mut seen_dimensions = std::collections::HashSet::new();

        let mut unique = Vec::with_capacity(self.0.len());

        for group in &self.0 {
            let first_seen = if !group.tag_key.is_empty() {
                seen_tags.insert(group.tag_key.as_str())
            } else if !group.dimension.is_empty() {
                seen_dimensions.insert(group.dimension.as_str())
            } else {
                false
            };
            if first_seen {
                unique.push(group.clone());
            }
        }

        CostGroupIdentifiers(unique)
    }

    /// Number of identifiers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identifier at a position
    pub fn get(&self, index: usize) -> Option<&CostGroupIdentifier> {
        self.0.get(index)
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = &CostGroupIdentifier> {
        self.0.iter()
    }
}

/// Logical cost query in universal vocabulary
///
/// `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQuery {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,

    /// Window end (exclusive)
    pub end: DateTime<Utc>,

    /// Bucket size
    #[serde(default)]
    pub granularity: Granularity,

    /// Tag filters, all of which must match
    #[serde(default)]
    pub filter_tags: Vec<CostFilterTag>,

    /// Grouping axes
    #[serde(default)]
    pub group_by: CostGroupIdentifiers,
}

impl CostQuery {
    /// Create a daily query over `[start, end)` with no filters or grouping
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            granularity: Granularity::default(),
            filter_tags: Vec::new(),
            group_by: CostGroupIdentifiers::default(),
        }
    }

    /// Set granularity
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Add a tag filter
    pub fn with_filter(mut self, filter: CostFilterTag) -> Self {
        self.filter_tags.push(filter);
        self
    }

    /// Add a group-by tag
    pub fn group_by_tag(mut self, tag_key: impl Into<String>) -> Self {
        self.group_by.0.push(CostGroupIdentifier::tag(tag_key));
        self
    }

    /// Add a group-by dimension
    pub fn group_by_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.group_by.0.push(CostGroupIdentifier::dimension(dimension));
        self
    }

    /// Reject windows where start is after end
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::Configuration(format!(
                "Invalid query window: start {} > end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}
