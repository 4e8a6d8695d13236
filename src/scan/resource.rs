//! Scanned resource model
//!
//! Resources are produced by provider collaborators and collected as-is by
//! the scan tracker. Nothing here transforms them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broad class of a scanned resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    /// Compute cluster (container orchestration, etc.)
    Cluster,
    /// Anything that stores data: buckets, databases, queues, caches
    Datastore,
    /// Registered domain or hosted zone
    Domain,
    /// Subdomain within a hosted zone
    Subdomain,
    /// Load balancers, gateways, CDNs
    Ingress,
    /// Virtual networks
    Network,
    /// Category not known to this crate
    #[default]
    #[serde(other)]
    Other,
}

impl ResourceCategory {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Cluster => "cluster",
            ResourceCategory::Datastore => "datastore",
            ResourceCategory::Domain => "domain",
            ResourceCategory::Subdomain => "subdomain",
            ResourceCategory::Ingress => "ingress",
            ResourceCategory::Network => "network",
            ResourceCategory::Other => "other",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification attached to a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTaxonomy {
    /// Broad class
    pub category: ResourceCategory,
    /// Finer class within the category (e.g. "postgres", "bucket")
    #[serde(default)]
    pub subcategory: String,
    /// Provider name (e.g. "aws")
    #[serde(default)]
    pub provider: String,
    /// Platform within the provider (e.g. "rds")
    #[serde(default)]
    pub platform: String,
    /// Platform variant (e.g. "aurora")
    #[serde(default)]
    pub subplatform: String,
}

impl ResourceTaxonomy {
    /// Create a taxonomy with a category and provider
    pub fn new(category: ResourceCategory, provider: impl Into<String>) -> Self {
        Self {
            category,
            provider: provider.into(),
            ..Default::default()
        }
    }

    /// Set the subcategory
    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = subcategory.into();
        self
    }

    /// Set platform and subplatform
    pub fn with_platform(mut self, platform: impl Into<String>, subplatform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self.subplatform = subplatform.into();
        self
    }
}

/// One resource found in a provider account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResource {
    /// Identifier unique within the account (ARN or equivalent)
    pub unique_id: String,
    /// Display name
    pub name: String,
    /// Classification
    #[serde(default)]
    pub taxonomy: ResourceTaxonomy,
    /// Provider service that owns the resource
    #[serde(default)]
    pub service_name: String,
    /// Resource name inside that service
    #[serde(default)]
    pub service_resource_name: String,
    /// Provider-specific attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl ScanResource {
    /// Create a resource with an id, name and taxonomy
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>, taxonomy: ResourceTaxonomy) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: name.into(),
            taxonomy,
            ..Default::default()
        }
    }

    /// Set the owning service and the resource's name inside it
    pub fn with_service(mut self, service_name: impl Into<String>, resource_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self.service_resource_name = resource_name.into();
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
