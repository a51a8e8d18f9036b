//! detector.rs — statistical spike and trend detection over the bucket
//! series.
//!
//! Pure business logic, no I/O: mean and population standard deviation over
//! bucket aggregate scores, a minimum-sample gate, and the half-vs-half trend
//! split. Stats are returned even when no spike is flagged so the caller can
//! log and chart them.

use serde::{Deserialize, Serialize};

use crate::config::SpikeConfig;
use crate::types::{SentimentBucket, SpikeDirection, Trend};

/// Components behind a spike verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeStats {
    pub current_score: f64,
    pub historical_mean: f64,
    pub std_dev: f64,
    /// `current_score - historical_mean` (signed).
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeResult {
    pub is_spike: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<SpikeDirection>,
    pub stats: SpikeStats,
}

impl SpikeResult {
    fn quiet(stats: SpikeStats) -> Self {
        Self {
            is_spike: false,
            direction: None,
            stats,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpikeDetector {
    std_dev_threshold: f64,
    min_sample_size: usize,
    trend_threshold: f64,
}

impl SpikeDetector {
    pub fn new(cfg: &SpikeConfig) -> Self {
        Self {
            std_dev_threshold: cfg.std_dev_threshold,
            min_sample_size: cfg.min_sample_size,
            trend_threshold: cfg.trend_threshold,
        }
    }

    /// Spike verdict for `current_score` against the bucket history.
    ///
    /// Below 2 buckets or below the sample-size gate no spike is ever
    /// claimed; with zero variance only a score strictly above the mean
    /// counts (and is by definition positive).
    pub fn detect_spike(&self, buckets: &[SentimentBucket], current_score: f64) -> SpikeResult {
        let scores: Vec<f64> = buckets.iter().map(|b| b.aggregate_score).collect();
        let historical_mean = mean(&scores);
        let std_dev = population_std_dev(&scores, historical_mean);
        let stats = SpikeStats {
            current_score,
            historical_mean,
            std_dev,
            deviation: current_score - historical_mean,
        };

        if scores.len() < 2 {
            return SpikeResult::quiet(stats);
        }

        let sample_size: usize = buckets.iter().map(|b| b.post_count).sum();
        if sample_size < self.min_sample_size {
            tracing::debug!(
                sample_size,
                min = self.min_sample_size,
                "sample below spike gate"
            );
            return SpikeResult::quiet(stats);
        }

        let is_spike = if std_dev == 0.0 {
            current_score > historical_mean
        } else {
            stats.deviation.abs() > self.std_dev_threshold * std_dev
        };

        if !is_spike {
            return SpikeResult::quiet(stats);
        }

        let direction = if current_score > historical_mean {
            SpikeDirection::Positive
        } else {
            SpikeDirection::Negative
        };
        SpikeResult {
            is_spike: true,
            direction: Some(direction),
            stats,
        }
    }

    /// Half-vs-half trend: compare the mean of the later half against the
    /// earlier half; deltas of exactly the threshold stay `stable`.
    pub fn calculate_trend(&self, buckets: &[SentimentBucket]) -> Trend {
        if buckets.len() < 2 {
            return Trend::Stable;
        }
        let scores: Vec<f64> = buckets.iter().map(|b| b.aggregate_score).collect();
        let mid = scores.len() / 2;
        let first = mean(&scores[..mid]);
        let second = mean(&scores[mid..]);
        let delta = second - first;

        if delta > self.trend_threshold {
            Trend::Rising
        } else if delta < -self.trend_threshold {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by n, not n-1).
fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
