// tests/aggregator_cycle.rs
//
// Aggregation cycles against scripted in-memory sources. Covered:
// - a cycle persists analyzed posts and reports per-source availability
// - one failing source degrades the cycle instead of aborting it
// - the language gate drops confidently foreign posts and counts them
// - a source recovering from an outage gets the widened backfill window
// - a cycle with zero working sources still completes

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::tempdir;

use zorg_sentiment::aggregator::Aggregator;
use zorg_sentiment::analyzer::SentimentAnalyzer;
use zorg_sentiment::config::{AggregationConfig, RateLimitConfig, StorageConfig};
use zorg_sentiment::ratelimit::RateLimiterRegistry;
use zorg_sentiment::sources::{DataSource, FetchError, SourceHealth};
use zorg_sentiment::storage::{bucket_id_for, BucketStore};
use zorg_sentiment::types::{RawPost, SourceId};

const DUTCH_1: &str = "De wachttijden in de ziekenhuizen zijn het afgelopen jaar opnieuw flink opgelopen, vooral bij de huisartsen in de grote steden.";
const DUTCH_2: &str = "Volgens de verpleegkundigen is de werkdruk op de spoedeisende hulp dit najaar weer veel te hoog geworden.";
const ENGLISH: &str = "The hospital waiting lists have grown significantly over the past year according to the latest government report.";

/// In-memory source: returns a fixed post list, or fails with a
/// non-retryable error so tests never sit in backoff sleeps.
struct ScriptedSource {
    id: SourceId,
    health: SourceHealth,
    posts: Vec<RawPost>,
    fail: bool,
    probe_ok: bool,
    windows: Mutex<Vec<(DateTime<Utc>, usize)>>,
}

impl ScriptedSource {
    fn healthy(id: SourceId, posts: Vec<RawPost>) -> Arc<Self> {
        Arc::new(Self {
            id,
            health: SourceHealth::new(),
            posts,
            fail: false,
            probe_ok: true,
            windows: Mutex::new(Vec::new()),
        })
    }

    fn failing(id: SourceId) -> Arc<Self> {
        Arc::new(Self {
            id,
            health: SourceHealth::new(),
            posts: Vec::new(),
            fail: true,
            probe_ok: false,
            windows: Mutex::new(Vec::new()),
        })
    }

    fn seen_windows(&self) -> Vec<(DateTime<Utc>, usize)> {
        self.windows.lock().expect("windows").clone()
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn health(&self) -> &SourceHealth {
        &self.health
    }

    async fn fetch_posts(
        &self,
        since: DateTime<Utc>,
        max_posts: usize,
    ) -> Result<Vec<RawPost>, FetchError> {
        self.windows.lock().expect("windows").push((since, max_posts));
        if self.fail {
            return Err(FetchError::RateLimited);
        }
        Ok(self.posts.clone())
    }

    async fn health_check(&self) -> bool {
        self.probe_ok
    }
}

fn raw(id: &str, source: SourceId, text: &str, at: DateTime<Utc>) -> RawPost {
    RawPost {
        id: id.to_string(),
        source,
        text: text.to_string(),
        author: None,
        created_at: at,
        url: None,
    }
}

fn store_in(root: &std::path::Path) -> Arc<BucketStore> {
    Arc::new(BucketStore::new(StorageConfig {
        data_dir: root.join("sentiment"),
        ..StorageConfig::default()
    }))
}

/// High budgets so cycle tests never wait on request spacing.
fn fast_limits() -> RateLimitConfig {
    RateLimitConfig {
        requests_per_minute: 6000,
        requests_per_hour: 100_000,
        per_source: Default::default(),
    }
}

fn aggregator_with(sources: Vec<Arc<dyn DataSource>>, store: Arc<BucketStore>) -> Aggregator {
    Aggregator::new(
        sources,
        Arc::new(RateLimiterRegistry::new(fast_limits())),
        SentimentAnalyzer::with_threshold(0.7),
        store,
        AggregationConfig::default(),
    )
}

#[tokio::test]
async fn cycle_persists_posts_and_isolates_failures() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    let twitter = ScriptedSource::healthy(
        SourceId::Twitter,
        vec![raw("twitter_1", SourceId::Twitter, DUTCH_1, now)],
    );
    let mastodon = ScriptedSource::healthy(
        SourceId::Mastodon,
        vec![raw("mastodon_1", SourceId::Mastodon, DUTCH_2, now)],
    );
    let reddit = ScriptedSource::failing(SourceId::Reddit);
    let sources: Vec<Arc<dyn DataSource>> =
        vec![twitter.clone(), mastodon.clone(), reddit.clone()];

    let agg = aggregator_with(sources, Arc::clone(&store));
    let cycle = agg.run_cycle().await.expect("cycle must survive one bad source");

    assert_eq!(cycle.fetched, 2);
    assert_eq!(cycle.posts.len(), 2);
    assert_eq!(cycle.available_sources(), 2);

    let failed = cycle
        .sources
        .iter()
        .find(|s| s.source_id == SourceId::Reddit)
        .expect("reddit status present");
    assert!(!failed.is_available());
    assert!(failed.error_message.is_some());

    let bucket = store
        .read_bucket(&bucket_id_for(now))
        .await
        .expect("bucket written");
    assert_eq!(bucket.post_count, 2);
}

#[tokio::test]
async fn language_gate_filters_confident_foreign_posts() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    let twitter = ScriptedSource::healthy(
        SourceId::Twitter,
        vec![
            raw("twitter_nl", SourceId::Twitter, DUTCH_1, now),
            raw("twitter_en", SourceId::Twitter, ENGLISH, now),
        ],
    );
    let sources: Vec<Arc<dyn DataSource>> = vec![twitter.clone()];

    let agg = aggregator_with(sources, store);
    let cycle = agg.run_cycle().await.expect("cycle");

    assert_eq!(cycle.fetched, 2);
    assert_eq!(cycle.posts.len(), 1);
    assert_eq!(cycle.language_filtered, 1);
    assert_eq!(cycle.posts[0].id, "twitter_nl");
    assert_eq!(cycle.posts[0].language, "nl");
}

#[tokio::test]
async fn normal_fetch_uses_the_lookback_window() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    let twitter = ScriptedSource::healthy(
        SourceId::Twitter,
        vec![raw("twitter_1", SourceId::Twitter, DUTCH_1, now)],
    );
    let sources: Vec<Arc<dyn DataSource>> = vec![twitter.clone()];

    let agg = aggregator_with(sources, store);
    let cycle = agg.run_cycle().await.expect("cycle");
    assert!(!cycle.backfilled);

    let windows = twitter.seen_windows();
    assert_eq!(windows.len(), 1);
    let (since, max_posts) = windows[0];
    assert_eq!(max_posts, 100);
    let minutes_back = (now - since).num_minutes();
    assert!(
        (59..=60).contains(&minutes_back),
        "lookback should be ~1h, got {minutes_back}m"
    );
}

#[tokio::test]
async fn recovered_source_gets_backfill_window() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    let reddit = ScriptedSource::healthy(
        SourceId::Reddit,
        vec![raw("reddit_1", SourceId::Reddit, DUTCH_2, now)],
    );
    // the previous cycle left this source unavailable
    reddit.health().mark_error("upstream down".to_string());
    let sources: Vec<Arc<dyn DataSource>> = vec![reddit.clone()];

    let agg = aggregator_with(sources, store);
    let cycle = agg.run_cycle().await.expect("cycle");
    assert!(cycle.backfilled);

    let windows = reddit.seen_windows();
    assert_eq!(windows.len(), 1);
    let (since, max_posts) = windows[0];
    assert_eq!(max_posts, 500, "backfill uses the widened post cap");
    let hours_back = (now - since).num_hours();
    assert!(
        (23..=24).contains(&hours_back),
        "backfill window should be ~24h, got {hours_back}h"
    );

    // the recovery also flips the health state back to available
    assert_eq!(cycle.available_sources(), 1);
}

#[tokio::test]
async fn cycle_with_all_sources_failing_still_completes() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());

    let sources: Vec<Arc<dyn DataSource>> = vec![
        ScriptedSource::failing(SourceId::Twitter),
        ScriptedSource::failing(SourceId::Reddit),
    ];

    let agg = aggregator_with(sources, store);
    let cycle = agg
        .run_cycle()
        .await
        .expect("a cycle without sources is degraded, not an error");

    assert_eq!(cycle.fetched, 0);
    assert!(cycle.posts.is_empty());
    assert_eq!(cycle.available_sources(), 0);
    assert!(cycle.sources.iter().all(|s| s.error_message.is_some()));
}
