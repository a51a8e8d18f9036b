//! types.rs — core data model for the sentiment pipeline.
//!
//! Everything downstream of the adapters speaks these shapes: raw posts in,
//! analyzed posts into hourly buckets, and one composed snapshot out. Scores
//! are kept in [-1, 1] everywhere; `clamp_score` is the single place that
//! enforces it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Twitter,
    Reddit,
    Mastodon,
    RssNuml,
    Tweakers,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::Twitter,
        SourceId::Reddit,
        SourceId::Mastodon,
        SourceId::RssNuml,
        SourceId::Tweakers,
    ];

    /// Wire/metric label, matches the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Twitter => "twitter",
            SourceId::Reddit => "reddit",
            SourceId::Mastodon => "mastodon",
            SourceId::RssNuml => "rss_numl",
            SourceId::Tweakers => "tweakers",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One post as fetched from an upstream feed. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    /// Source-qualified unique id, e.g. `reddit_abc123`.
    pub id: String,
    pub source: SourceId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A post that passed the language gate and was scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedPost {
    pub id: String,
    pub source: SourceId,
    pub text: String,
    /// Always within [-1, 1].
    pub sentiment_score: f64,
    /// `"nl"` for detected Dutch, `"und"` for kept-but-undetermined.
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub analyzed_at: DateTime<Utc>,
}

/// One hourly aggregation unit, owned by the bucket store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentBucket {
    /// Derived from the truncated-to-hour timestamp, `YYYY-MM-DD-HH` (UTC).
    pub bucket_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub posts: Vec<AnalyzedPost>,
    /// Arithmetic mean of contained posts' scores; 0 when empty.
    pub aggregate_score: f64,
    pub post_count: usize,
}

/// Post-free view of a bucket, used in the snapshot's hourly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub bucket_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub aggregate_score: f64,
    pub post_count: usize,
}

impl From<&SentimentBucket> for BucketSummary {
    fn from(b: &SentimentBucket) -> Self {
        Self {
            bucket_id: b.bucket_id.clone(),
            start_time: b.start_time,
            end_time: b.end_time,
            aggregate_score: b.aggregate_score,
            post_count: b.post_count,
        }
    }
}

impl BucketSummary {
    /// Placeholder for an hour with no data.
    pub fn empty(bucket_id: String, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            bucket_id,
            start_time,
            end_time,
            aggregate_score: 0.0,
            post_count: 0,
        }
    }
}

/// One rotated calendar day, stored in the per-month daily files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub avg_composite: f64,
    pub min_composite: f64,
    pub max_composite: f64,
    pub total_mentions: usize,
    /// How many hourly buckets were folded into this day.
    pub hourly_buckets: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceAvailability {
    Available,
    Unavailable,
}

/// Per-adapter health, refreshed every aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceStatus {
    pub source_id: SourceId,
    pub status: SourceAvailability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DataSourceStatus {
    pub fn is_available(&self) -> bool {
        self.status == SourceAvailability::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpikeDirection {
    Positive,
    Negative,
}

/// Sample-size based confidence tier for the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Total post count across the recent bucket window.
    pub sample_size: usize,
    pub confidence: ConfidenceTier,
    /// Whole minutes since the latest populated bucket's end, clamped at 0.
    pub staleness_minutes: i64,
    /// Share of this cycle's fetched posts dropped by the language gate.
    pub language_filter_rate: f64,
}

/// Per-topic rollup for the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSentiment {
    pub topic_id: String,
    /// Dutch label shown on the dashboard, e.g. "Wachttijden".
    pub display_name: String,
    pub sentiment_score: f64,
    pub sample_size: usize,
    /// High score variance: opinion is split rather than consensual.
    pub is_polarizing: bool,
}

/// A score extreme and when it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremePoint {
    pub score: f64,
    pub at: DateTime<Utc>,
}

/// Longer-horizon context from hourly buckets plus rotated daily aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context30Day {
    pub min: ExtremePoint,
    pub max: ExtremePoint,
    pub days_analyzed: usize,
}

/// The externally visible aggregate, cached with a TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub overall_score: f64,
    pub trend: Trend,
    pub spike_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spike_direction: Option<SpikeDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_30day: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_30day: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_30day: Option<Context30Day>,
    pub age_minutes: i64,
    pub is_stale: bool,
    pub last_updated: DateTime<Utc>,
    pub data_quality: DataQuality,
    pub topics: Vec<TopicSentiment>,
    pub sources: Vec<DataSourceStatus>,
    /// Exactly 24 hourly slots, ascending, gaps filled with empty summaries.
    pub hourly_buckets: Vec<BucketSummary>,
}

/// Clamp a sentiment value into the canonical [-1, 1] range.
pub fn clamp_score(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}
