//! Cost querying
//!
//! A `Coster` answers a `CostQuery` for one account. `PagedCoster` builds one
//! from a page-fetching collaborator, and `MultiCoster` fans a query out to
//! many costers and merges what comes back.
//!
//! ```text
//! CostQuery --Vocabulary--> NativeCostQuery --CostPageSource--> pages
//!     pages --CostResultAggregator--> CostResult (per source)
//!     CostResult x N --MultiCoster--> CostResult + joined error
//! ```

pub mod aggregator;
pub mod fanout;
pub mod paged;
pub mod result;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::CostQuery;

pub use aggregator::{AggregatorStats, CostResultAggregator, RawGroup, RawMetricValue, RawResultWindow};
pub use fanout::MultiCoster;
pub use paged::{CostPage, CostPageSource, PagedCoster};
pub use result::{CostResult, MergeOutcome, WindowMerger};

/// A source of cost data for one account or provider
#[async_trait]
pub trait Coster: Send + Sync {
    /// Name used in logs, metrics and error context
    fn name(&self) -> &str;

    /// Run a cost query
    ///
    /// Implementations must stop outstanding provider calls once `cancel`
    /// fires and report `Error::Cancelled`.
    async fn get_costs(&self, cancel: &CancellationToken, query: &CostQuery) -> Result<CostResult>;
}
