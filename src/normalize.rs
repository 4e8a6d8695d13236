//! Tag and dimension vocabulary normalization
//!
//! Callers speak a small universal vocabulary ("stack", "env", "block",
//! "account"). Every provider spells those differently. A `Vocabulary`
//! translates in both directions and rewrites a `CostQuery` into the
//! provider's spelling before it reaches the collaborator making the call.
//!
//! Lookups are total: an unknown key passes through unchanged in either
//! direction. Provider-specific keys with no universal equivalent can still
//! be used, they are just not normalized.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CostQuery, Granularity, KEY_VALUE_DELIMITER};

/// Universal vocabulary
pub mod universal {
    /// Tag naming the stack a resource belongs to
    pub const TAG_STACK: &str = "stack";
    /// Tag naming the environment a resource belongs to
    pub const TAG_ENV: &str = "env";
    /// Tag naming the block (component) a resource belongs to
    pub const TAG_BLOCK: &str = "block";
    /// Dimension naming the cloud account
    pub const DIMENSION_ACCOUNT: &str = "account";
}

/// Default provider date format for daily and monthly windows
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Provider timestamp format for hourly windows
pub const HOURLY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Bidirectional term table
#[derive(Debug, Clone, Default)]
struct TermMap {
    to_native: HashMap<String, String>,
    to_universal: HashMap<String, String>,
}

impl TermMap {
    fn insert(&mut self, universal: &str, native: &str) {
        // Drop stale reverse entries so the table stays a bijection
        if let Some(old_native) = self.to_native.insert(universal.to_string(), native.to_string()) {
            self.to_universal.remove(&old_native);
        }
        if let Some(old_universal) = self.to_universal.insert(native.to_string(), universal.to_string())
        {
            if old_universal != universal {
                self.to_native.remove(&old_universal);
            }
        }
    }

    fn native<'a>(&'a self, universal: &'a str) -> &'a str {
        self.to_native.get(universal).map_or(universal, String::as_str)
    }

    fn universal<'a>(&'a self, native: &'a str) -> &'a str {
        self.to_universal.get(native).map_or(native, String::as_str)
    }

    fn len(&self) -> usize {
        self.to_native.len()
    }
}

/// Extra mappings loaded from configuration (universal -> native)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyOverrides {
    /// Tag mappings
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Dimension mappings
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

/// Translation table between universal and one provider's vocabulary
#[derive(Debug, Clone)]
pub struct Vocabulary {
    provider_type: String,
    tags: TermMap,
    dimensions: TermMap,
    delimiter: char,
    date_format: String,
}

impl Vocabulary {
    /// Vocabulary that maps every key to itself
    pub fn identity(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            tags: TermMap::default(),
            dimensions: TermMap::default(),
            delimiter: KEY_VALUE_DELIMITER,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    /// AWS cost-explorer spelling
    ///
    /// # Example
    ///
    /// ```rust
    /// use cloudcost::normalize::{universal, Vocabulary};
    ///
    /// let aws = Vocabulary::aws();
    /// assert_eq!(aws.to_universal_tag("Stack"), universal::TAG_STACK);
    /// assert_eq!(aws.to_native_dimension(universal::DIMENSION_ACCOUNT), "LINKED_ACCOUNT");
    /// assert_eq!(aws.to_native_tag("custom:unknown-key"), "custom:unknown-key");
    /// ```
    pub fn aws() -> Self {
        Self::identity("aws")
            .with_tag(universal::TAG_STACK, "Stack")
            .with_tag(universal::TAG_ENV, "Env")
            .with_tag(universal::TAG_BLOCK, "Block")
            .with_dimension(universal::DIMENSION_ACCOUNT, "LINKED_ACCOUNT")
    }

    /// Add a tag mapping
    pub fn with_tag(mut self, universal: &str, native: &str) -> Self {
        self.tags.insert(universal, native);
        self
    }

    /// Add a dimension mapping
    pub fn with_dimension(mut self, universal: &str, native: &str) -> Self {
        self.dimensions.insert(universal, native);
        self
    }

    /// Set the in-band delimiter used in provider group keys
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the provider date format (chrono strftime syntax)
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Merge configured mappings over the built-in ones
    pub fn apply_overrides(mut self, overrides: &VocabularyOverrides) -> Self {
        for (universal, native) in &overrides.tags {
            self.tags.insert(universal, native);
        }
        for (universal, native) in &overrides.dimensions {
            self.dimensions.insert(universal, native);
        }
        self
    }

    /// Provider type this vocabulary belongs to
    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    /// In-band delimiter between key and value in provider group keys
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Date format for daily and monthly windows
    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Format used for window bounds at a granularity
    pub fn window_format(&self, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Hourly => HOURLY_DATE_FORMAT,
            Granularity::Daily | Granularity::Monthly => &self.date_format,
        }
    }

    /// Number of tag and dimension mappings
    pub fn mapping_count(&self) -> usize {
        self.tags.len() + self.dimensions.len()
    }

    /// Universal tag key to native
    pub fn to_native_tag<'a>(&'a self, key: &'a str) -> &'a str {
        self.tags.native(key)
    }

    /// Native tag key to universal
    pub fn to_universal_tag<'a>(&'a self, key: &'a str) -> &'a str {
        self.tags.universal(key)
    }

    /// Universal dimension name to native
    pub fn to_native_dimension<'a>(&'a self, name: &'a str) -> &'a str {
        self.dimensions.native(name)
    }

    /// Native dimension name to universal
    pub fn to_universal_dimension<'a>(&'a self, name: &'a str) -> &'a str {
        self.dimensions.universal(name)
    }

    /// Universal key to native, trying tags then dimensions
    pub fn to_native<'a>(&'a self, key: &'a str) -> &'a str {
        let tag = self.tags.native(key);
        if tag != key {
            return tag;
        }
        self.dimensions.native(key)
    }

    /// Native key to universal, trying tags then dimensions
    pub fn to_universal<'a>(&'a self, key: &'a str) -> &'a str {
        let tag = self.tags.universal(key);
        if tag != key {
            return tag;
        }
        self.dimensions.universal(key)
    }

    /// Split a raw provider group key on the in-band delimiter
    ///
    /// Returns `None` when the delimiter is absent.
    pub fn split_group_key<'a>(&self, raw: &'a str) -> Option<(&'a str, &'a str)> {
        raw.split_once(self.delimiter)
    }

    /// Rewrite a universal query into this provider's spelling
    ///
    /// Group-by identifiers are de-duplicated first. Metric names are passed
    /// through as given.
    pub fn translate_query(&self, query: &CostQuery, metrics: &[String]) -> NativeCostQuery {
        let format = self.window_format(query.granularity);

        let filters = query
            .filter_tags
            .iter()
            .map(|f| NativeFilter {
                key: self.to_native_tag(&f.key).to_string(),
                values: f.values.clone(),
            })
            .collect();

        let group_by = query
            .group_by
            .unique()
            .iter()
            .map(|g| {
                if !g.tag_key.is_empty() {
                    NativeGroupBy::Tag(self.to_native_tag(&g.tag_key).to_string())
                } else {
                    NativeGroupBy::Dimension(self.to_native_dimension(&g.dimension).to_string())
                }
            })
            .collect();

        NativeCostQuery {
            start: format_bound(query.start, format),
            end: format_bound(query.end, format),
            granularity: query.granularity,
            metrics: metrics.to_vec(),
            filters,
            group_by,
        }
    }
}

fn format_bound(at: DateTime<Utc>, format: &str) -> String {
    at.format(format).to_string()
}

/// Tag filter in provider spelling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFilter {
    /// Native tag key
    pub key: String,
    /// Accepted values
    pub values: Vec<String>,
}

/// Group-by axis in provider spelling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "lowercase")]
pub enum NativeGroupBy {
    /// Native tag key
    Tag(String),
    /// Native dimension name
    Dimension(String),
}

/// Cost query in provider spelling, ready for the collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCostQuery {
    /// Window start formatted in provider date format
    pub start: String,
    /// Window end (exclusive) formatted in provider date format
    pub end: String,
    /// Bucket size
    pub granularity: Granularity,
    /// Metric names to request
    pub metrics: Vec<String>,
    /// Tag filters, all of which must match
    pub filters: Vec<NativeFilter>,
    /// Grouping axes, de-duplicated, in query order
    pub group_by: Vec<NativeGroupBy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CostFilterTag, CostGroupIdentifier, CostGroupIdentifiers};
    use chrono::TimeZone;

    #[test]
    fn test_unknown_keys_pass_through() {
        let aws = Vocabulary::aws();
        assert_eq!(aws.to_native_tag("custom:unknown-key"), "custom:unknown-key");
        assert_eq!(aws.to_universal_tag("custom:unknown-key"), "custom:unknown-key");
        assert_eq!(aws.to_native("custom:unknown-key"), "custom:unknown-key");
        assert_eq!(aws.to_universal_dimension("SERVICE"), "SERVICE");
    }

    #[test]
    fn test_aws_mappings_are_bidirectional() {
        let aws = Vocabulary::aws();
        for (universal, native) in [("stack", "Stack"), ("env", "Env"), ("block", "Block")] {
            assert_eq!(aws.to_native_tag(universal), native);
            assert_eq!(aws.to_universal_tag(native), universal);
        }
        assert_eq!(aws.to_universal("Stack"), "stack");
        assert_eq!(aws.to_universal("LINKED_ACCOUNT"), "account");
        assert_eq!(aws.to_native("account"), "LINKED_ACCOUNT");
    }

    #[test]
    fn test_identity_vocabulary() {
        let identity = Vocabulary::identity("gcp");
        assert_eq!(identity.to_native_tag("stack"), "stack");
        assert_eq!(identity.to_universal_tag("Stack"), "Stack");
        assert_eq!(identity.mapping_count(), 0);
    }

    #[test]
    fn test_remapping_keeps_bijection() {
        let vocab = Vocabulary::aws().with_tag("stack", "nullstack");
        assert_eq!(vocab.to_native_tag("stack"), "nullstack");
        assert_eq!(vocab.to_universal_tag("nullstack"), "stack");
        // Old native spelling no longer maps back
        assert_eq!(vocab.to_universal_tag("Stack"), "Stack");
    }

    #[test]
    fn test_overrides() {
        let mut overrides = VocabularyOverrides::default();
        overrides.tags.insert("team".to_string(), "Team".to_string());
        overrides
            .dimensions
            .insert("service".to_string(), "SERVICE".to_string());

        let vocab = Vocabulary::aws().apply_overrides(&overrides);
        assert_eq!(vocab.to_native_tag("team"), "Team");
        assert_eq!(vocab.to_universal_dimension("SERVICE"), "service");
        assert_eq!(vocab.to_native_tag("env"), "Env");
    }

    #[test]
    fn test_split_group_key() {
        let aws = Vocabulary::aws();
        assert_eq!(aws.split_group_key("Env$prod"), Some(("Env", "prod")));
        assert_eq!(aws.split_group_key("Env$"), Some(("Env", "")));
        assert_eq!(aws.split_group_key("a$b$c"), Some(("a", "b$c")));
        assert_eq!(aws.split_group_key("123456789012"), None);
    }

    #[test]
    fn test_translate_query() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut query = CostQuery::new(start, end)
            .with_filter(CostFilterTag::new("stack", ["core", "edge"]))
            .with_filter(CostFilterTag::new("custom", ["x"]));
        query.group_by = CostGroupIdentifiers(vec![
            CostGroupIdentifier::tag("env"),
            CostGroupIdentifier::dimension("account"),
            CostGroupIdentifier::tag("env"),
        ]);

        let native = Vocabulary::aws().translate_query(&query, &["UnblendedCost".to_string()]);

        assert_eq!(native.start, "2024-01-01");
        assert_eq!(native.end, "2024-02-01");
        assert_eq!(native.granularity, Granularity::Daily);
        assert_eq!(native.metrics, vec!["UnblendedCost"]);
        assert_eq!(native.filters[0].key, "Stack");
        assert_eq!(native.filters[0].values, vec!["core", "edge"]);
        assert_eq!(native.filters[1].key, "custom");
        assert_eq!(
            native.group_by,
            vec![
                NativeGroupBy::Tag("Env".to_string()),
                NativeGroupBy::Dimension("LINKED_ACCOUNT".to_string()),
            ]
        );
    }

    #[test]
    fn test_translate_hourly_uses_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let query = CostQuery::new(start, end).with_granularity(Granularity::Hourly);

        let native = Vocabulary::aws().translate_query(&query, &[]);
        assert_eq!(native.start, "2024-01-01T05:00:00Z");
        assert_eq!(native.end, "2024-01-01T09:00:00Z");
    }
}
