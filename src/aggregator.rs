//! aggregator.rs — one collection cycle across all feeds.
//!
//! Fetches run concurrently (bounded by `fetch_concurrency`), each behind
//! its source's rate limiter. A failing source is isolated: it is marked
//! unavailable and the cycle continues with whatever the rest returned.
//! A source seen down last cycle that now passes its health probe gets one
//! widened backfill window to repair the gap it left.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::analyzer::SentimentAnalyzer;
use crate::config::AggregationConfig;
use crate::ratelimit::{RateLimiter, RateLimiterRegistry};
use crate::sources::{fetch_with_retry, DataSource};
use crate::storage::BucketStore;
use crate::topics;
use crate::types::{AnalyzedPost, DataSourceStatus, RawPost, SourceId};

/// What one cycle produced, plus the counts the snapshot quality block
/// needs.
#[derive(Debug)]
pub struct AggregateCycle {
    pub posts: Vec<AnalyzedPost>,
    pub sources: Vec<DataSourceStatus>,
    pub backfilled: bool,
    pub fetched: usize,
    pub language_filtered: usize,
}

impl AggregateCycle {
    pub fn available_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_available()).count()
    }
}

pub struct Aggregator {
    sources: Vec<Arc<dyn DataSource>>,
    limiters: Arc<RateLimiterRegistry>,
    analyzer: SentimentAnalyzer,
    store: Arc<BucketStore>,
    cfg: AggregationConfig,
}

struct SourceFetch {
    source_id: SourceId,
    posts: Vec<RawPost>,
    backfilled: bool,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn DataSource>>,
        limiters: Arc<RateLimiterRegistry>,
        analyzer: SentimentAnalyzer,
        store: Arc<BucketStore>,
        cfg: AggregationConfig,
    ) -> Self {
        Self {
            sources,
            limiters,
            analyzer,
            store,
            cfg,
        }
    }

    pub fn source_statuses(&self) -> Vec<DataSourceStatus> {
        self.sources.iter().map(|s| s.status()).collect()
    }

    /// Fetch, analyze and persist one round. Only a storage failure is
    /// fatal; source failures degrade the cycle instead.
    pub async fn run_cycle(&self) -> Result<AggregateCycle> {
        let cycle_started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.cfg.fetch_concurrency));
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let limiter = self.limiters.for_source(source.source_id());
            let semaphore = Arc::clone(&semaphore);
            let cfg = self.cfg.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fetch semaphore closed");
                fetch_source(source, limiter, cfg).await
            });
        }

        let mut raw_posts: Vec<RawPost> = Vec::new();
        let mut backfilled = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(fetch) => {
                    tracing::debug!(
                        source = %fetch.source_id,
                        posts = fetch.posts.len(),
                        "source fetch finished"
                    );
                    backfilled |= fetch.backfilled;
                    raw_posts.extend(fetch.posts);
                }
                Err(e) => tracing::error!(error = %e, "source fetch task panicked"),
            }
        }

        let fetched = raw_posts.len();
        let posts = self
            .analyzer
            .analyze_batch(&raw_posts, topics::extract_topics);
        let language_filtered = fetched - posts.len();

        if let Err(e) = self.store.add_posts(&posts).await {
            metrics::counter!("sentiment_cycle_failures_total").increment(1);
            return Err(e);
        }
        if let Err(e) = self.store.clean_old_buckets().await {
            tracing::warn!(error = %e, "bucket cleanup failed");
        }

        let sources = self.source_statuses();
        let available = sources.iter().filter(|s| s.is_available()).count();

        metrics::counter!("sentiment_cycles_total").increment(1);
        metrics::counter!("sentiment_posts_fetched_total").increment(fetched as u64);
        metrics::counter!("sentiment_posts_analyzed_total").increment(posts.len() as u64);
        metrics::counter!("sentiment_posts_language_filtered_total")
            .increment(language_filtered as u64);
        metrics::gauge!("sentiment_sources_available").set(available as f64);

        tracing::info!(
            fetched,
            analyzed = posts.len(),
            language_filtered,
            sources_available = available,
            backfilled,
            elapsed_ms = cycle_started.elapsed().as_millis() as u64,
            "aggregation cycle finished"
        );

        Ok(AggregateCycle {
            posts,
            sources,
            backfilled,
            fetched,
            language_filtered,
        })
    }
}

async fn fetch_source(
    source: Arc<dyn DataSource>,
    limiter: Arc<RateLimiter>,
    cfg: AggregationConfig,
) -> SourceFetch {
    let id = source.source_id();

    // down last cycle + probe passes now = recovery, widen the window once
    let recovering = source.health().was_unavailable() && source.health_check().await;
    let (window_hours, max_posts) = if recovering {
        (cfg.backfill_hours, cfg.backfill_max_posts)
    } else {
        (cfg.lookback_hours, cfg.max_posts)
    };
    let since = Utc::now() - Duration::hours(window_hours);
    if recovering {
        tracing::info!(source = %id, window_hours, "source recovered, backfilling");
    }

    let started = Instant::now();
    let src = source.as_ref();
    let result = limiter
        .schedule(|| fetch_with_retry(src, since, max_posts))
        .await;
    metrics::histogram!("sentiment_source_fetch_duration_ms", "source" => id.as_str())
        .record(started.elapsed().as_secs_f64() * 1_000.0);

    match result {
        Ok(posts) => {
            if recovering {
                metrics::counter!("sentiment_backfills_total").increment(1);
                tracing::info!(source = %id, posts = posts.len(), "backfill fetch complete");
            }
            SourceFetch {
                source_id: id,
                posts,
                backfilled: recovering,
            }
        }
        // already logged and health-marked inside the retry wrapper
        Err(_) => SourceFetch {
            source_id: id,
            posts: Vec::new(),
            backfilled: false,
        },
    }
}
