//! snapshot.rs — composes the cached national-mood snapshot.
//!
//! One entry point: `get_snapshot`. A fresh cache entry is returned as-is;
//! otherwise a full cycle runs (fetch, analyze, store) and the result is
//! composed, cached and returned. Degraded outcomes are never cached, so
//! the next request tries again immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

use crate::aggregator::Aggregator;
use crate::alerts::{AlertKind, AlertWebhook};
use crate::cache::SnapshotCache;
use crate::config::SentimentConfig;
use crate::detector::SpikeDetector;
use crate::error::SnapshotError;
use crate::storage::{bucket_id_for, hour_floor, BucketStore};
use crate::topics;
use crate::types::{
    BucketSummary, ConfidenceTier, DataQuality, SentimentBucket, SentimentSnapshot, SourceId,
    TopicSentiment,
};

/// Below this many available sources the snapshot degrades instead of
/// presenting a skewed national number.
pub const MIN_AVAILABLE_SOURCES: usize = 2;

/// Slots in the snapshot's hourly series.
const HOURLY_SLOTS: i64 = 24;
const CONTEXT_DAYS: i64 = 30;
const MIN_TOPIC_MENTIONS: usize = 3;
/// Population variance above which a topic counts as polarizing.
const POLARIZATION_VARIANCE: f64 = 0.5;
/// Data older than this raises the staleness alert (distinct from the
/// `is_stale` flag, which trips earlier).
const STALE_ALERT_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn header_value(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "HIT",
            CacheOutcome::Miss => "MISS",
        }
    }
}

pub struct SnapshotService {
    aggregator: Aggregator,
    store: Arc<BucketStore>,
    detector: SpikeDetector,
    cache: SnapshotCache,
    alerts: Arc<AlertWebhook>,
    cfg: SentimentConfig,
}

impl SnapshotService {
    pub fn new(
        aggregator: Aggregator,
        store: Arc<BucketStore>,
        alerts: AlertWebhook,
        cfg: &SentimentConfig,
    ) -> Self {
        Self {
            aggregator,
            store,
            detector: SpikeDetector::new(&cfg.spike),
            cache: SnapshotCache::with_ttl_minutes(cfg.cache.ttl_minutes),
            alerts: Arc::new(alerts),
            cfg: cfg.clone(),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Seconds for the HTTP `max-age` hint, tied to the cache TTL.
    pub fn cache_max_age_secs(&self) -> u64 {
        self.cfg.cache.ttl_minutes * 60
    }

    pub async fn get_snapshot(
        &self,
    ) -> Result<(SentimentSnapshot, CacheOutcome), SnapshotError> {
        if let Some(snapshot) = self.cache.get() {
            metrics::counter!("sentiment_snapshot_cache_hits_total").increment(1);
            return Ok((snapshot, CacheOutcome::Hit));
        }
        metrics::counter!("sentiment_snapshot_cache_misses_total").increment(1);

        let started = Instant::now();
        let built = self.build_snapshot().await;
        metrics::histogram!("sentiment_snapshot_build_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        let snapshot = built?;
        metrics::gauge!("sentiment_overall_score").set(snapshot.overall_score);
        self.cache.put(snapshot.clone());
        Ok((snapshot, CacheOutcome::Miss))
    }

    async fn build_snapshot(&self) -> Result<SentimentSnapshot, SnapshotError> {
        let cycle = self.aggregator.run_cycle().await?;

        let available: Vec<SourceId> = cycle
            .sources
            .iter()
            .filter(|s| s.is_available())
            .map(|s| s.source_id)
            .collect();
        if available.len() < MIN_AVAILABLE_SOURCES {
            if available.is_empty() {
                self.fire_alert(
                    AlertKind::AllSourcesUnavailable,
                    "all data sources failed this cycle".to_string(),
                );
            }
            let unavailable = cycle
                .sources
                .iter()
                .filter(|s| !s.is_available())
                .cloned()
                .collect();
            return Err(SnapshotError::InsufficientSources {
                attempted: cycle.sources.len(),
                available,
                unavailable,
            });
        }

        let buckets = self
            .store
            .get_recent_buckets()
            .await
            .map_err(SnapshotError::Storage)?;
        if buckets.is_empty() {
            return Err(SnapshotError::InsufficientData(
                "no sentiment data in the retention window".to_string(),
            ));
        }

        let now = Utc::now();
        let overall_score = buckets
            .last()
            .map(|b| b.aggregate_score)
            .unwrap_or_default();

        // the newest bucket is the observation, everything before it the
        // baseline
        let spike = self
            .detector
            .detect_spike(&buckets[..buckets.len() - 1], overall_score);
        if spike.is_spike {
            metrics::counter!("sentiment_spikes_total").increment(1);
            tracing::warn!(
                current = spike.stats.current_score,
                mean = spike.stats.historical_mean,
                std_dev = spike.stats.std_dev,
                direction = ?spike.direction,
                "sentiment spike detected"
            );
        }
        let trend = self.detector.calculate_trend(&buckets);

        let sample_size: usize = buckets.iter().map(|b| b.post_count).sum();
        let age_minutes = data_age_minutes(&buckets, now);
        let language_filter_rate = if cycle.fetched == 0 {
            0.0
        } else {
            cycle.language_filtered as f64 / cycle.fetched as f64
        };

        let context_30day = match self.store.historical_context(CONTEXT_DAYS).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(error = %e, "30-day context unavailable");
                None
            }
        };
        let (min_30day, max_30day) = match &context_30day {
            Some(ctx) => (Some(ctx.min.score), Some(ctx.max.score)),
            None => (None, None),
        };

        let is_stale = age_minutes > self.cfg.cache.stale_after_minutes;
        if age_minutes > STALE_ALERT_MINUTES {
            self.fire_alert(
                AlertKind::DataStale,
                format!("latest sentiment data is {age_minutes} minutes old"),
            );
        }

        Ok(SentimentSnapshot {
            overall_score,
            trend,
            spike_detected: spike.is_spike,
            spike_direction: spike.direction,
            min_30day,
            max_30day,
            context_30day,
            age_minutes,
            is_stale,
            last_updated: now,
            data_quality: DataQuality {
                sample_size,
                confidence: confidence_for(sample_size),
                staleness_minutes: age_minutes,
                language_filter_rate,
            },
            topics: topic_rollup(&buckets),
            sources: cycle.sources,
            hourly_buckets: hourly_series(&buckets, now),
        })
    }

    /// Alerts never block or fail a snapshot build.
    fn fire_alert(&self, kind: AlertKind, message: String) {
        let alerts = Arc::clone(&self.alerts);
        tokio::spawn(async move {
            alerts.notify(kind, &message).await;
        });
    }
}

fn confidence_for(sample_size: usize) -> ConfidenceTier {
    if sample_size >= 100 {
        ConfidenceTier::High
    } else if sample_size >= 50 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// Minutes since the newest populated bucket's end; fresh data clamps at 0.
fn data_age_minutes(buckets: &[SentimentBucket], now: DateTime<Utc>) -> i64 {
    let reference = buckets
        .iter()
        .rev()
        .find(|b| b.post_count > 0)
        .or_else(|| buckets.last());
    match reference {
        Some(bucket) => (now - bucket.end_time).num_minutes().max(0),
        None => 0,
    }
}

/// Exactly 24 ascending hourly slots ending at the current hour; hours
/// without a bucket become empty summaries so the series has no holes.
fn hourly_series(buckets: &[SentimentBucket], now: DateTime<Utc>) -> Vec<BucketSummary> {
    let newest_start = hour_floor(now);
    let by_start: HashMap<DateTime<Utc>, &SentimentBucket> =
        buckets.iter().map(|b| (b.start_time, b)).collect();

    let mut series = Vec::with_capacity(HOURLY_SLOTS as usize);
    for back in (0..HOURLY_SLOTS).rev() {
        let start = newest_start - Duration::hours(back);
        match by_start.get(&start) {
            Some(bucket) => series.push(BucketSummary::from(*bucket)),
            None => {
                let end = start + Duration::hours(1);
                series.push(BucketSummary::empty(bucket_id_for(start), start, end));
            }
        }
    }
    series
}

/// Per-topic mean and polarization over every post in the window. Topics
/// below the mention floor stay out; busiest topics come first.
fn topic_rollup(buckets: &[SentimentBucket]) -> Vec<TopicSentiment> {
    let mut per_topic: HashMap<&str, Vec<f64>> = HashMap::new();
    for bucket in buckets {
        for post in &bucket.posts {
            for topic in &post.topics {
                per_topic
                    .entry(topic.as_str())
                    .or_default()
                    .push(post.sentiment_score);
            }
        }
    }

    let mut out: Vec<TopicSentiment> = per_topic
        .into_iter()
        .filter(|(_, scores)| scores.len() >= MIN_TOPIC_MENTIONS)
        .map(|(topic_id, scores)| {
            let n = scores.len() as f64;
            let avg = scores.iter().sum::<f64>() / n;
            let variance = scores.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / n;
            TopicSentiment {
                topic_id: topic_id.to_string(),
                display_name: topics::display_name(topic_id).to_string(),
                sentiment_score: avg,
                sample_size: scores.len(),
                is_polarizing: variance > POLARIZATION_VARIANCE,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.sample_size
            .cmp(&a.sample_size)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    out
}
