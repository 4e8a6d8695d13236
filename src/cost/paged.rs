//! Per-source cost pipeline
//!
//! `PagedCoster` turns a page-fetching collaborator into a `Coster`: it
//! translates the query into provider spelling, pulls pages until the
//! provider stops returning a continuation token, and folds every page with
//! the `CostResultAggregator`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cost::aggregator::{CostResultAggregator, RawResultWindow};
use crate::cost::result::CostResult;
use crate::cost::Coster;
use crate::error::{Error, Result};
use crate::normalize::{NativeCostQuery, Vocabulary};
use crate::types::CostQuery;

/// Default metric requested when none is configured
pub const DEFAULT_METRIC: &str = "UnblendedCost";

/// One page of provider results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostPage {
    /// Result windows on this page
    #[serde(default)]
    pub windows: Vec<RawResultWindow>,
    /// Continuation token; absent or empty on the last page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl CostPage {
    /// Last page holding `windows`
    pub fn last(windows: Vec<RawResultWindow>) -> Self {
        Self {
            windows,
            next_page_token: None,
        }
    }

    /// Page holding `windows` followed by the page at `token`
    pub fn with_next(windows: Vec<RawResultWindow>, token: impl Into<String>) -> Self {
        Self {
            windows,
            next_page_token: Some(token.into()),
        }
    }
}

/// Collaborator that executes the provider billing call
///
/// Implementations own credentials and the wire call. They receive the query
/// already in provider spelling.
#[async_trait]
pub trait CostPageSource: Send + Sync {
    /// Fetch one page; `page_token` is `None` for the first page
    async fn fetch_page(
        &self,
        cancel: &CancellationToken,
        query: &NativeCostQuery,
        page_token: Option<&str>,
    ) -> Result<CostPage>;
}

#[async_trait]
impl<S: CostPageSource + ?Sized> CostPageSource for Arc<S> {
    async fn fetch_page(
        &self,
        cancel: &CancellationToken,
        query: &NativeCostQuery,
        page_token: Option<&str>,
    ) -> Result<CostPage> {
        (**self).fetch_page(cancel, query, page_token).await
    }
}

/// `Coster` backed by a paginated provider source
pub struct PagedCoster<S> {
    name: String,
    source: S,
    vocabulary: Arc<Vocabulary>,
    metrics: Vec<String>,
}

impl<S: CostPageSource> PagedCoster<S> {
    /// Create a coster requesting `UnblendedCost`
    pub fn new(name: impl Into<String>, source: S, vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            name: name.into(),
            source,
            vocabulary,
            metrics: vec![DEFAULT_METRIC.to_string()],
        }
    }

    /// Replace the requested metric names
    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Vocabulary used for translation and key parsing
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

#[async_trait]
impl<S: CostPageSource> Coster for PagedCoster<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_costs(&self, cancel: &CancellationToken, query: &CostQuery) -> Result<CostResult> {
        query.validate()?;

        let native = self.vocabulary.translate_query(query, &self.metrics);
        let mut aggregator = CostResultAggregator::new(&self.vocabulary, &query.group_by)
            .with_date_format(self.vocabulary.window_format(query.granularity));

        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::cancelled(&self.name));
            }

            let page = self
                .source
                .fetch_page(cancel, &native, page_token.as_deref())
                .await?;
            aggregator.add_results(&page.windows)?;
            pages += 1;

            match page.next_page_token.filter(|t| !t.is_empty()) {
                None => break,
                Some(next) if !seen_tokens.insert(next.clone()) => {
                    return Err(Error::MalformedData(format!(
                        "page token {:?} returned twice",
                        next
                    )));
                }
                Some(next) => page_token = Some(next),
            }
        }

        let stats = aggregator.stats();
        debug!(
            source = %self.name,
            pages = pages,
            windows = stats.windows,
            points = stats.points,
            "Folded cost pages"
        );

        Ok(aggregator.into_result())
    }
}
