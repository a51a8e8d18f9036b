//! config.rs — runtime configuration.
//!
//! Tunables live in an optional TOML file (`SENTIMENT_CONFIG_PATH`, default
//! `config/sentiment.toml`); every field has a serde default so an absent or
//! partial file is fine. Credentials and deployment paths come from the
//! environment only and are never written to the config file.

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::types::{ConfidenceTier, SourceId};

const DEFAULT_CONFIG_PATH: &str = "config/sentiment.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub aggregation: AggregationConfig,
    pub spike: SpikeConfig,
    pub analyzer: AnalyzerConfig,
    pub rate_limits: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot TTL; also drives the HTTP max-age hint.
    pub ttl_minutes: u64,
    /// Snapshot counts as stale past this many minutes of data age.
    pub stale_after_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 15,
            stale_after_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Window for read-recent and the snapshot series.
    pub retention_hours: i64,
    pub bucket_size_minutes: i64,
    /// Hourly files older than this are folded into daily aggregates.
    pub long_term_retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/sentiment"),
            retention_hours: 24,
            bucket_size_minutes: 60,
            long_term_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub lookback_hours: i64,
    pub max_posts: usize,
    /// Extended window used once after a source recovers.
    pub backfill_hours: i64,
    pub backfill_max_posts: usize,
    pub fetch_concurrency: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 1,
            max_posts: 100,
            backfill_hours: 24,
            backfill_max_posts: 500,
            fetch_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Deviation multiplier: spike when |current - mean| > threshold * sigma.
    pub std_dev_threshold: f64,
    /// Minimum summed post_count before any spike is claimed.
    pub min_sample_size: usize,
    /// Half-vs-half mean delta beyond which the trend leaves "stable".
    pub trend_threshold: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            std_dev_threshold: 2.0,
            min_sample_size: 50,
            trend_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Confidence above which a non-Dutch detection drops the post.
    pub language_detection_threshold: f64,
    /// Tier below which the dashboard shows a low-confidence warning.
    pub min_confidence: ConfidenceTier,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            language_detection_threshold: 0.7,
            min_confidence: ConfidenceTier::Low,
        }
    }
}

/// Minute/hour budget for one source.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SourceBudget {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fallback budget for sources without an explicit entry.
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub per_source: HashMap<SourceId, SourceBudget>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Hourly budgets mirror the upstream quotas each feed tolerates.
        let per_source = HashMap::from([
            (
                SourceId::Twitter,
                SourceBudget {
                    requests_per_minute: 30,
                    requests_per_hour: 100,
                },
            ),
            (
                SourceId::Reddit,
                SourceBudget {
                    requests_per_minute: 30,
                    requests_per_hour: 60,
                },
            ),
            (
                SourceId::Mastodon,
                SourceBudget {
                    requests_per_minute: 60,
                    requests_per_hour: 300,
                },
            ),
            (
                SourceId::RssNuml,
                SourceBudget {
                    requests_per_minute: 30,
                    requests_per_hour: 60,
                },
            ),
            (
                SourceId::Tweakers,
                SourceBudget {
                    requests_per_minute: 30,
                    requests_per_hour: 60,
                },
            ),
        ]);
        Self {
            requests_per_minute: 30,
            requests_per_hour: 60,
            per_source,
        }
    }
}

impl RateLimitConfig {
    pub fn budget_for(&self, source: SourceId) -> SourceBudget {
        self.per_source
            .get(&source)
            .copied()
            .unwrap_or(SourceBudget {
                requests_per_minute: self.requests_per_minute,
                requests_per_hour: self.requests_per_hour,
            })
    }
}

impl SentimentConfig {
    /// Load config: `SENTIMENT_CONFIG_PATH` > `config/sentiment.toml` >
    /// built-in defaults. A missing file is not an error; a malformed one is
    /// logged and replaced by defaults so the service still boots.
    pub fn load() -> Self {
        let path = env::var("SENTIMENT_CONFIG_PATH")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<SentimentConfig>(&raw) {
                Ok(cfg) => {
                    tracing::info!(%path, "loaded sentiment config");
                    cfg
                }
                Err(e) => {
                    tracing::error!(%path, error = %e, "malformed sentiment config, using defaults");
                    SentimentConfig::default()
                }
            },
            Err(_) => {
                tracing::info!(%path, "no config file, using defaults");
                SentimentConfig::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        cfg
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: SentimentConfig = toml::from_str(raw)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("SENTIMENT_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(ttl) = env_parse::<u64>("SENTIMENT_TTL_MINUTES") {
            self.cache.ttl_minutes = ttl;
        }
        if let Some(hours) = env_parse::<i64>("SENTIMENT_LOOKBACK_HOURS") {
            self.aggregation.lookback_hours = hours;
        }
    }

    /// Pull obviously broken values back to defaults instead of failing boot.
    fn sanitize(&mut self) {
        if self.cache.ttl_minutes == 0 {
            self.cache.ttl_minutes = CacheConfig::default().ttl_minutes;
        }
        if self.cache.stale_after_minutes <= 0 {
            self.cache.stale_after_minutes = CacheConfig::default().stale_after_minutes;
        }
        if self.storage.retention_hours <= 0 {
            self.storage.retention_hours = StorageConfig::default().retention_hours;
        }
        if self.storage.bucket_size_minutes <= 0 {
            self.storage.bucket_size_minutes = StorageConfig::default().bucket_size_minutes;
        }
        if self.storage.long_term_retention_days <= 0 {
            self.storage.long_term_retention_days =
                StorageConfig::default().long_term_retention_days;
        }
        if self.aggregation.lookback_hours <= 0 {
            self.aggregation.lookback_hours = AggregationConfig::default().lookback_hours;
        }
        if self.aggregation.fetch_concurrency == 0 {
            self.aggregation.fetch_concurrency = AggregationConfig::default().fetch_concurrency;
        }
        if self.aggregation.max_posts == 0 {
            self.aggregation.max_posts = AggregationConfig::default().max_posts;
        }
        if self.aggregation.backfill_max_posts < self.aggregation.max_posts {
            self.aggregation.backfill_max_posts = self.aggregation.max_posts;
        }
        if self.spike.std_dev_threshold <= 0.0 {
            self.spike.std_dev_threshold = SpikeConfig::default().std_dev_threshold;
        }
        if self.spike.trend_threshold < 0.0 {
            self.spike.trend_threshold = SpikeConfig::default().trend_threshold;
        }
        if !(0.0..=1.0).contains(&self.analyzer.language_detection_threshold) {
            self.analyzer.language_detection_threshold =
                AnalyzerConfig::default().language_detection_threshold;
        }
        for budget in self.rate_limits.per_source.values_mut() {
            if budget.requests_per_minute == 0 {
                budget.requests_per_minute = 1;
            }
            if budget.requests_per_hour == 0 {
                budget.requests_per_hour = 1;
            }
        }
        if self.rate_limits.requests_per_minute == 0 {
            self.rate_limits.requests_per_minute = 1;
        }
        if self.rate_limits.requests_per_hour == 0 {
            self.rate_limits.requests_per_hour = 1;
        }
    }
}

/// Credentials and endpoints for the adapters, environment-only.
#[derive(Debug, Clone, Default)]
pub struct SourceCredentials {
    pub twitter_bearer_token: Option<String>,
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,
    pub mastodon_instance_url: String,
    pub mastodon_access_token: Option<String>,
    pub nu_rss_url: String,
    pub tweakers_rss_url: String,
    pub alert_webhook_url: Option<String>,
}

impl SourceCredentials {
    pub fn from_env() -> Self {
        Self {
            twitter_bearer_token: env_nonempty("TWITTER_BEARER_TOKEN"),
            reddit_client_id: env_nonempty("REDDIT_CLIENT_ID"),
            reddit_client_secret: env_nonempty("REDDIT_CLIENT_SECRET"),
            reddit_user_agent: env_nonempty("REDDIT_USER_AGENT")
                .unwrap_or_else(|| "zorg-sentiment/0.1".to_string()),
            mastodon_instance_url: env_nonempty("MASTODON_INSTANCE_URL")
                .unwrap_or_else(|| "https://mastodon.nl".to_string()),
            mastodon_access_token: env_nonempty("MASTODON_ACCESS_TOKEN"),
            nu_rss_url: env_nonempty("NU_RSS_URL")
                .unwrap_or_else(|| "https://www.nu.nl/rss/Gezondheid".to_string()),
            tweakers_rss_url: env_nonempty("TWEAKERS_RSS_URL")
                .unwrap_or_else(|| "https://tweakers.net/feeds/mixed.xml".to_string()),
            alert_webhook_url: env_nonempty("ALERT_WEBHOOK_URL"),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Existence flags for the debug endpoint; never carries values.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfigPresence {
    pub twitter_bearer_token: bool,
    pub reddit_client_id: bool,
    pub reddit_client_secret: bool,
    pub mastodon_access_token: bool,
    pub alert_webhook_url: bool,
    pub data_dir: String,
    pub ttl_minutes: u64,
    pub std_dev_threshold: f64,
    pub min_sample_size: usize,
    pub language_detection_threshold: f64,
    pub min_confidence: ConfidenceTier,
}

impl ConfigPresence {
    pub fn collect(cfg: &SentimentConfig, creds: &SourceCredentials) -> Self {
        Self {
            twitter_bearer_token: creds.twitter_bearer_token.is_some(),
            reddit_client_id: creds.reddit_client_id.is_some(),
            reddit_client_secret: creds.reddit_client_secret.is_some(),
            mastodon_access_token: creds.mastodon_access_token.is_some(),
            alert_webhook_url: creds.alert_webhook_url.is_some(),
            data_dir: cfg.storage.data_dir.display().to_string(),
            ttl_minutes: cfg.cache.ttl_minutes,
            std_dev_threshold: cfg.spike.std_dev_threshold,
            min_sample_size: cfg.spike.min_sample_size,
            language_detection_threshold: cfg.analyzer.language_detection_threshold,
            min_confidence: cfg.analyzer.min_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let cfg = SentimentConfig::default();
        assert_eq!(cfg.cache.ttl_minutes, 15);
        assert_eq!(cfg.storage.retention_hours, 24);
        assert_eq!(cfg.storage.bucket_size_minutes, 60);
        assert_eq!(cfg.storage.long_term_retention_days, 30);
        assert_eq!(cfg.aggregation.lookback_hours, 1);
        assert_eq!(cfg.aggregation.backfill_hours, 24);
        assert_eq!(cfg.aggregation.backfill_max_posts, 500);
        assert_eq!(cfg.aggregation.fetch_concurrency, 5);
        assert!((cfg.spike.std_dev_threshold - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.spike.min_sample_size, 50);
        assert!((cfg.spike.trend_threshold - 0.05).abs() < f64::EPSILON);
        assert!((cfg.analyzer.language_detection_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let cfg = SentimentConfig::from_toml_str(
            r#"
            [cache]
            ttl_minutes = 5

            [spike]
            min_sample_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.ttl_minutes, 5);
        assert_eq!(cfg.spike.min_sample_size, 10);
        // untouched sections keep their defaults
        assert_eq!(cfg.storage.retention_hours, 24);
        assert_eq!(cfg.rate_limits.budget_for(SourceId::Mastodon).requests_per_hour, 300);
    }

    #[test]
    fn sanitize_rescues_broken_values() {
        let cfg = SentimentConfig::from_toml_str(
            r#"
            [cache]
            ttl_minutes = 0

            [spike]
            std_dev_threshold = -1.0

            [analyzer]
            language_detection_threshold = 4.2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.ttl_minutes, 15);
        assert!((cfg.spike.std_dev_threshold - 2.0).abs() < f64::EPSILON);
        assert!((cfg.analyzer.language_detection_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn per_source_budget_override_and_fallback() {
        let cfg = SentimentConfig::from_toml_str(
            r#"
            [rate_limits]
            requests_per_minute = 10
            requests_per_hour = 20

            [rate_limits.per_source.twitter]
            requests_per_minute = 2
            requests_per_hour = 50
            "#,
        )
        .unwrap();
        let tw = cfg.rate_limits.budget_for(SourceId::Twitter);
        assert_eq!(tw.requests_per_minute, 2);
        assert_eq!(tw.requests_per_hour, 50);
        // no entry -> global fallback (explicit per_source table replaces defaults)
        let rd = cfg.rate_limits.budget_for(SourceId::Reddit);
        assert_eq!(rd.requests_per_minute, 10);
        assert_eq!(rd.requests_per_hour, 20);
    }
}
