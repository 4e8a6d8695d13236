//! Provider registry
//!
//! Maps a provider type (e.g. "aws") to the factory that builds its coster
//! and scanner. Factories are registered once at startup; building a
//! `MultiCoster` or `MultiScanner` from configuration resolves every
//! provider up front and fails on the first unknown type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, CostConfig, Provider, ScanConfig};
use crate::cost::{Coster, MultiCoster};
use crate::error::{Error, Result};
use crate::normalize::Vocabulary;
use crate::scan::{MultiScanner, Scanner};

/// Builds provider-specific costers and scanners
///
/// A provider may support only one of the two; the default methods report
/// no support.
pub trait ProviderFactory: Send + Sync {
    /// Provider type this factory handles
    fn provider_type(&self) -> &str;

    /// Built-in vocabulary for this provider
    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::identity(self.provider_type())
    }

    /// Build the cost source for one account
    fn coster(
        &self,
        _provider: &Provider,
        _vocabulary: Arc<Vocabulary>,
        _config: &CostConfig,
    ) -> Result<Option<Arc<dyn Coster>>> {
        Ok(None)
    }

    /// Build the resource scanner for one account
    fn scanner(&self, _provider: &Provider, _config: &ScanConfig) -> Result<Option<Arc<dyn Scanner>>> {
        Ok(None)
    }
}

/// Registry of provider factories keyed by provider type
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, returning the one it replaced
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) -> Option<Arc<dyn ProviderFactory>> {
        let provider_type = factory.provider_type().to_string();
        debug!(provider_type = %provider_type, "Registering provider factory");
        self.factories.insert(provider_type, factory)
    }

    /// Check if a provider type is registered
    pub fn contains(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registered provider types, sorted
    pub fn provider_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Look up the factory for a provider type
    pub fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>> {
        self.factories
            .get(provider_type)
            .ok_or_else(|| Error::UnsupportedProvider(provider_type.to_string()))
    }

    /// Vocabulary for a provider type with configured overrides applied
    pub fn vocabulary(&self, provider_type: &str, config: &Config) -> Result<Vocabulary> {
        let mut vocabulary = self
            .factory(provider_type)?
            .vocabulary()
            .with_date_format(config.cost.date_format.clone());
        if let Some(overrides) = config.vocabulary_overrides(provider_type) {
            vocabulary = vocabulary.apply_overrides(overrides);
        }
        Ok(vocabulary)
    }

    /// Build a cost fan-out over every configured provider that supports costs
    pub fn multi_coster(&self, config: &Config) -> Result<MultiCoster> {
        let mut vocabularies: HashMap<&str, Arc<Vocabulary>> = HashMap::new();
        let mut multi = MultiCoster::default().with_max_concurrent(config.cost.max_concurrent_sources);

        for provider in &config.providers {
            let factory = self.factory(&provider.provider_type)?;

            let vocabulary = match vocabularies.get(provider.provider_type.as_str()) {
                Some(vocabulary) => Arc::clone(vocabulary),
                None => {
                    let vocabulary = Arc::new(self.vocabulary(&provider.provider_type, config)?);
                    vocabularies.insert(&provider.provider_type, Arc::clone(&vocabulary));
                    vocabulary
                }
            };

            match factory.coster(provider, vocabulary, &config.cost)? {
                Some(coster) => multi.push(coster),
                None => debug!(provider = %provider.name, "Provider has no cost source"),
            }
        }

        Ok(multi)
    }

    /// Build a multi-account scanner over every configured provider that supports scans
    pub fn multi_scanner(&self, config: &Config) -> Result<MultiScanner> {
        let mut multi = MultiScanner::default();

        for provider in &config.providers {
            let factory = self.factory(&provider.provider_type)?;
            match factory.scanner(provider, &config.scan)? {
                Some(scanner) => multi.push(scanner),
                None => debug!(provider = %provider.name, "Provider has no scanner"),
            }
        }

        Ok(multi)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("provider_types", &self.provider_types())
            .finish()
    }
}
