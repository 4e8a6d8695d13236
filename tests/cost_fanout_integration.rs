/// Integration tests for the cost pipeline
///
/// Each source is a `PagedCoster` over an in-memory page source, so these
/// tests cover query translation, page folding, fan-out and merging together.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cloudcost::config::{Config, CostConfig, Provider};
use cloudcost::cost::{CostPage, CostPageSource, Coster, MultiCoster, PagedCoster, RawMetricValue, RawResultWindow};
use cloudcost::normalize::{NativeCostQuery, NativeGroupBy, Vocabulary};
use cloudcost::registry::{ProviderFactory, ProviderRegistry};
use cloudcost::types::{CostQuery, Granularity, GroupKey, GroupKeySet};
use cloudcost::{Error, Result};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Collaborators
// ============================================================================

/// Serves a fixed list of pages, chained by "page-<n>" tokens
struct StaticPages {
    pages: Vec<Vec<RawResultWindow>>,
    calls: AtomicUsize,
}

impl StaticPages {
    fn new(pages: Vec<Vec<RawResultWindow>>) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CostPageSource for StaticPages {
    async fn fetch_page(
        &self,
        _: &CancellationToken,
        query: &NativeCostQuery,
        page_token: Option<&str>,
    ) -> Result<CostPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(query
            .group_by
            .iter()
            .all(|g| *g != NativeGroupBy::Dimension("account".to_string())));

        let index = match page_token {
            None => 0,
            Some(token) => token
                .trim_start_matches("page-")
                .parse::<usize>()
                .map_err(|e| Error::MalformedData(e.to_string()))?,
        };
        let windows = self.pages.get(index).cloned().unwrap_or_default();
        if index + 1 < self.pages.len() {
            Ok(CostPage::with_next(windows, format!("page-{}", index + 1)))
        } else {
            Ok(CostPage::last(windows))
        }
    }
}

/// Always fails with an access error
struct Forbidden;

#[async_trait]
impl CostPageSource for Forbidden {
    async fn fetch_page(&self, _: &CancellationToken, _: &NativeCostQuery, _: Option<&str>) -> Result<CostPage> {
        Err(Error::wrap("GetCostAndUsage", "AccessDeniedException"))
    }
}

/// Waits for cancellation like a well-behaved network call
struct Stalled;

#[async_trait]
impl CostPageSource for Stalled {
    async fn fetch_page(&self, cancel: &CancellationToken, _: &NativeCostQuery, _: Option<&str>) -> Result<CostPage> {
        cancel.cancelled().await;
        Err(Error::cancelled("GetCostAndUsage"))
    }
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

fn account_window(start: &str, end: &str, account: &str, amount: &str) -> RawResultWindow {
    RawResultWindow::new(start, end).with_group(
        [account],
        "UnblendedCost",
        RawMetricValue::new(amount, "USD"),
    )
}

fn account_query() -> CostQuery {
    CostQuery::new(day(1), day(3)).group_by_dimension("account")
}

fn account_keys(account: &str) -> GroupKeySet {
    GroupKeySet::from(vec![GroupKey::dimension("account", account)])
}

fn paged<S: CostPageSource + 'static>(name: &str, source: S) -> Arc<dyn Coster> {
    Arc::new(PagedCoster::new(name, source, Arc::new(Vocabulary::aws())))
}

// ============================================================================
// Merge Behaviour
// ============================================================================

/// Two sources report the same series and window with different values
#[tokio::test]
async fn test_same_window_from_two_sources_kept_once() {
    let source_a = paged(
        "a",
        StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", "123", "100.00")]]),
    );
    let source_b = paged(
        "b",
        StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", "123", "200.00")]]),
    );
    let multi = MultiCoster::new(vec![source_a, source_b]);

    let partial = multi.get_costs(&CancellationToken::new(), &account_query()).await;
    assert!(partial.is_complete());

    let series = partial
        .value
        .find(&account_keys("123"), "UnblendedCost")
        .expect("series for account 123");
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].start, day(1));
    assert_eq!(series.points[0].end, day(2));
    assert_eq!(series.points[0].unit, "USD");
}

/// Overlapping sources contribute the union of their windows
#[tokio::test]
async fn test_overlapping_sources_union_windows() {
    let source_a = paged(
        "a",
        StaticPages::new(vec![
            vec![account_window("2024-01-01", "2024-01-02", "123", "10")],
            vec![account_window("2024-01-02", "2024-01-03", "123", "20")],
        ]),
    );
    let source_b = paged(
        "b",
        StaticPages::new(vec![vec![
            account_window("2024-01-02", "2024-01-03", "123", "20"),
            account_window("2024-01-03", "2024-01-04", "123", "30"),
        ]]),
    );

    let partial = MultiCoster::new(vec![source_a, source_b])
        .get_costs(&CancellationToken::new(), &account_query())
        .await;

    let series = partial.value.find(&account_keys("123"), "UnblendedCost").unwrap();
    let values: Vec<_> = series.points.iter().map(|p| p.value.as_str()).collect();
    assert_eq!(values, vec!["10", "20", "30"]);
}

/// Merged output does not depend on which source finishes first
#[tokio::test]
async fn test_merge_independent_of_source_order() {
    let build = |reversed: bool| {
        let mut sources = vec![
            paged("a", StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", "1", "1")]])),
            paged("b", StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", "2", "2")]])),
            paged("c", StaticPages::new(vec![vec![account_window("2024-01-02", "2024-01-03", "1", "3")]])),
        ];
        if reversed {
            sources.reverse();
        }
        MultiCoster::new(sources)
    };

    let forward = build(false).get_costs(&CancellationToken::new(), &account_query()).await;
    let backward = build(true).get_costs(&CancellationToken::new(), &account_query()).await;
    assert_eq!(forward.value, backward.value);
    assert_eq!(forward.value.series_count(), 2);
    assert_eq!(forward.value.point_count(), 3);
}

// ============================================================================
// Partial Failure
// ============================================================================

/// N sources, K fail: every successful series survives, K errors joined
#[tokio::test]
async fn test_k_of_n_sources_fail() {
    let mut sources = Vec::new();
    for i in 0..5 {
        let account = format!("{}", 100 + i);
        sources.push(paged(
            &format!("ok-{}", i),
            StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", &account, "1.00")]]),
        ));
    }
    sources.push(paged("denied-1", Forbidden));
    sources.push(paged("denied-2", Forbidden));

    let partial = MultiCoster::new(sources)
        .get_costs(&CancellationToken::new(), &account_query())
        .await;

    assert_eq!(partial.value.series_count(), 5);
    let error = partial.error.expect("joined error");
    assert_eq!(error.len(), 2);

    let mut names: Vec<String> = error
        .errors()
        .iter()
        .map(|e| match e {
            Error::Source { source_name, .. } => source_name.clone(),
            other => panic!("unexpected error {:?}", other),
        })
        .collect();
    names.sort();
    assert_eq!(names, vec!["denied-1", "denied-2"]);
    assert!(error.to_string().contains("AccessDeniedException"));
}

/// Every source fails: empty result, never absent
#[tokio::test]
async fn test_total_failure_returns_empty_result() {
    let partial = MultiCoster::new(vec![paged("x", Forbidden), paged("y", Forbidden)])
        .get_costs(&CancellationToken::new(), &account_query())
        .await;

    assert!(partial.value.is_empty());
    assert_eq!(partial.failure_count(), 2);
    assert!(partial.into_result().is_err());
}

/// A malformed page fails only its own source
#[tokio::test]
async fn test_malformed_source_does_not_affect_siblings() {
    let good = paged(
        "good",
        StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", "1", "5")]]),
    );
    let bad = paged(
        "bad",
        StaticPages::new(vec![vec![account_window("Jan 1", "2024-01-02", "2", "5")]]),
    );

    let partial = MultiCoster::new(vec![good, bad])
        .get_costs(&CancellationToken::new(), &account_query())
        .await;

    assert_eq!(partial.value.series_count(), 1);
    let error = partial.error.unwrap();
    assert_eq!(error.len(), 1);
    assert!(error.to_string().starts_with("bad: Malformed upstream data"));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_aborts_outstanding_sources() {
    let finished = paged(
        "fast",
        StaticPages::new(vec![vec![account_window("2024-01-01", "2024-01-02", "1", "5")]]),
    );
    let multi = MultiCoster::new(vec![finished, paged("slow-1", Stalled), paged("slow-2", Stalled)]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        trigger.cancel();
    });

    let partial = tokio::time::timeout(Duration::from_secs(5), multi.get_costs(&cancel, &account_query()))
        .await
        .expect("fan-out returns after cancellation");

    assert_eq!(partial.value.series_count(), 1);
    let error = partial.error.unwrap();
    assert_eq!(error.len(), 2);
    assert!(Error::Joined(error).is_cancelled());
}

#[tokio::test]
async fn test_bounded_fan_out_queries_every_source() {
    let sources: Vec<Arc<dyn Coster>> = (0..8)
        .map(|i| {
            paged(
                &format!("src-{}", i),
                StaticPages::new(vec![vec![account_window(
                    "2024-01-01",
                    "2024-01-02",
                    &i.to_string(),
                    "1",
                )]]),
            )
        })
        .collect();

    let partial = MultiCoster::new(sources)
        .with_max_concurrent(2)
        .get_costs(&CancellationToken::new(), &account_query())
        .await;

    assert!(partial.is_complete());
    assert_eq!(partial.value.series_count(), 8);
}

// ============================================================================
// Registry Wiring
// ============================================================================

struct InMemoryFactory {
    windows: Vec<RawResultWindow>,
}

impl ProviderFactory for InMemoryFactory {
    fn provider_type(&self) -> &str {
        "aws"
    }

    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::aws()
    }

    fn coster(
        &self,
        provider: &Provider,
        vocabulary: Arc<Vocabulary>,
        config: &CostConfig,
    ) -> Result<Option<Arc<dyn Coster>>> {
        let coster = PagedCoster::new(
            provider.name.clone(),
            StaticPages::new(vec![self.windows.clone()]),
            vocabulary,
        )
        .with_metrics(config.metrics.clone());
        Ok(Some(Arc::new(coster)))
    }
}

#[tokio::test]
async fn test_registry_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloudcost.toml");
    std::fs::write(
        &path,
        r#"
        [cost]
        max_concurrent_sources = 2

        [[providers]]
        name = "prod"
        provider_type = "aws"
        account_id = "111111111111"

        [[providers]]
        name = "staging"
        provider_type = "aws"
        account_id = "222222222222"
        "#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(InMemoryFactory {
        windows: vec![RawResultWindow::new("2024-01-01", "2024-01-02").with_group(
            ["Env$prod"],
            "UnblendedCost",
            RawMetricValue::new("3.50", "USD"),
        )],
    }));

    let multi = registry.multi_coster(&config).unwrap();
    assert_eq!(multi.names(), vec!["prod", "staging"]);

    let query = config.cost.query(day(1), day(2)).group_by_tag("env");
    assert_eq!(query.granularity, Granularity::Daily);
    let partial = multi.get_costs(&CancellationToken::new(), &query).await;
    assert!(partial.is_complete());

    // Both accounts report the same window for the same series
    let keys = GroupKeySet::from(vec![GroupKey::tag("env", "prod")]);
    let series = partial.value.find(&keys, "UnblendedCost").unwrap();
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].value, "3.50");
}
