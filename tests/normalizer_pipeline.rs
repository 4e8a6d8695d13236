/// Integration tests for vocabulary translation through the cost pipeline
///
/// A query written in universal vocabulary goes out in provider spelling and
/// the provider's keys come back in universal spelling.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use cloudcost::config::Config;
use cloudcost::cost::{
    CostPage, CostPageSource, CostResultAggregator, Coster, PagedCoster, RawMetricValue,
    RawResultWindow,
};
use cloudcost::normalize::{universal, NativeCostQuery, NativeGroupBy, Vocabulary};
use cloudcost::types::{CostFilterTag, CostQuery, Granularity, GroupKey, GroupKeySet, SeriesKey};
use cloudcost::Result;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Echoes back one group per requested group-by axis
struct EchoSource {
    seen: Mutex<Option<NativeCostQuery>>,
}

#[async_trait]
impl CostPageSource for EchoSource {
    async fn fetch_page(
        &self,
        _: &CancellationToken,
        query: &NativeCostQuery,
        _: Option<&str>,
    ) -> Result<CostPage> {
        *self.seen.lock() = Some(query.clone());

        let keys: Vec<String> = query
            .group_by
            .iter()
            .map(|g| match g {
                NativeGroupBy::Tag(key) => format!("{}$value-of-{}", key, key),
                NativeGroupBy::Dimension(_) => "999999999999".to_string(),
            })
            .collect();
        let window = RawResultWindow::new(query.start.clone(), query.end.clone()).with_group(
            keys,
            &query.metrics[0],
            RawMetricValue::new("1.23", "USD"),
        );
        Ok(CostPage::last(vec![window]))
    }
}

#[test]
fn test_identity_fallback_and_known_mapping() {
    let aws = Vocabulary::aws();
    assert_eq!(aws.to_native("custom:unknown-key"), "custom:unknown-key");
    assert_eq!(aws.to_universal("custom:unknown-key"), "custom:unknown-key");
    assert_eq!(aws.to_universal("Stack"), universal::TAG_STACK);
    assert_eq!(aws.to_universal("LINKED_ACCOUNT"), universal::DIMENSION_ACCOUNT);
    assert_eq!(aws.to_native(universal::TAG_ENV), "Env");
}

#[tokio::test]
async fn test_round_trip_through_provider_spelling() {
    let source = Arc::new(EchoSource {
        seen: Mutex::new(None),
    });
    let coster = PagedCoster::new("prod", Arc::clone(&source), Arc::new(Vocabulary::aws()))
        .with_metrics(vec!["BlendedCost".to_string()]);

    let query = CostQuery::new(
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
    )
    .with_granularity(Granularity::Monthly)
    .with_filter(CostFilterTag::new(universal::TAG_STACK, ["core"]))
    .group_by_dimension(universal::DIMENSION_ACCOUNT)
    .group_by_tag(universal::TAG_ENV)
    .group_by_tag(universal::TAG_ENV);

    let result = coster.get_costs(&CancellationToken::new(), &query).await.unwrap();

    let native = source.seen.lock().clone().expect("provider was called");
    assert_eq!(native.start, "2024-02-01");
    assert_eq!(native.end, "2024-03-01");
    assert_eq!(native.granularity, Granularity::Monthly);
    assert_eq!(native.filters[0].key, "Stack");
    assert_eq!(native.filters[0].values, vec!["core".to_string()]);
    assert_eq!(
        native.group_by,
        vec![
            NativeGroupBy::Dimension("LINKED_ACCOUNT".to_string()),
            NativeGroupBy::Tag("Env".to_string()),
        ]
    );

    // Undelimited keys take their dimension name from the group-by position
    let keys = GroupKeySet::from(vec![
        GroupKey::dimension(universal::DIMENSION_ACCOUNT, "999999999999"),
        GroupKey::tag(universal::TAG_ENV, "value-of-Env"),
    ]);
    let series = result.find(&keys, "BlendedCost").expect("series in universal spelling");
    assert_eq!(series.points[0].value, "1.23");
}

#[test]
fn test_configured_overrides_reach_the_aggregator() {
    let config: Config = r#"
        [vocabulary.aws.tags]
        team = "Team"
        env = "Environment"
    "#
    .parse()
    .unwrap();

    let vocabulary =
        Vocabulary::aws().apply_overrides(config.vocabulary_overrides("aws").unwrap());
    assert_eq!(vocabulary.to_native_tag("env"), "Environment");
    // The replaced spelling no longer maps back
    assert_eq!(vocabulary.to_universal_tag("Env"), "Env");

    let mut aggregator = CostResultAggregator::new(&vocabulary, &Default::default());
    aggregator
        .add_results(&[RawResultWindow::new("2024-01-01", "2024-01-02")
            .with_group(["Environment$prod", "Team$data"], "UnblendedCost", RawMetricValue::new("4", "USD"))])
        .unwrap();

    let result = aggregator.into_result();
    let keys = GroupKeySet::from(vec![GroupKey::tag("env", "prod"), GroupKey::tag("team", "data")]);
    assert!(result.find(&keys, "UnblendedCost").is_some());
}

#[test]
fn test_custom_delimiter_vocabulary() {
    let gcp = Vocabulary::identity("gcp")
        .with_delimiter('=')
        .with_tag(universal::TAG_ENV, "environment");

    let mut aggregator = CostResultAggregator::new(&gcp, &Default::default());
    aggregator
        .add_results(&[RawResultWindow::new("2024-01-01", "2024-01-02")
            .with_group(["environment=prod"], "cost", RawMetricValue::new("9", "USD"))])
        .unwrap();

    let keys = GroupKeySet::from(vec![GroupKey::tag("env", "prod")]);
    let result = aggregator.into_result();
    assert!(result.find(&keys, "cost").is_some());

    // Canonical keys stay on `$` whatever the provider delimiter
    assert_eq!(SeriesKey::new(&keys, "cost").as_str(), "env$prod:cost");
}

#[test]
fn test_unnamed_position_gets_synthetic_dimension() {
    let aws = Vocabulary::aws();
    let query = CostQuery::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
    )
    .group_by_tag(universal::TAG_ENV);

    // Provider answered with an undelimited key where a tag was requested
    let mut aggregator = CostResultAggregator::new(&aws, &query.group_by);
    aggregator
        .add_results(&[RawResultWindow::new("2024-01-01", "2024-01-02")
            .with_group(["prod"], "cost", RawMetricValue::new("1", "USD"))])
        .unwrap();

    let keys = GroupKeySet::from(vec![GroupKey::dimension("dimension-0", "prod")]);
    assert!(aggregator.result().find(&keys, "cost").is_some());
}
