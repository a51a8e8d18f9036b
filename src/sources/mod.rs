//! sources — the five feed adapters behind one trait.
//!
//! Every adapter turns its upstream API into `RawPost`s and keeps its own
//! health state; the aggregator only sees the trait. Fetch errors never
//! cross a cycle boundary: transient ones are retried here, the rest mark
//! the source unavailable and the cycle moves on without it.

pub mod mastodon;
pub mod nu_rss;
pub mod reddit;
pub mod tweakers;
pub mod twitter;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::SourceCredentials;
use crate::types::{DataSourceStatus, RawPost, SourceAvailability, SourceId};

pub const USER_AGENT: &str = "zorg-sentiment/0.1";

/// Transient failures get this many extra attempts before the source is
/// marked unavailable for the cycle.
const MAX_TRANSIENT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Required credentials are absent; the source sits out every cycle
    /// until they appear.
    #[error("credentials not configured")]
    NotConfigured,
    /// Upstream told us to back off. Never retried within a cycle.
    #[error("rate limited by upstream")]
    RateLimited,
    /// Bad or expired credentials. Retrying would only burn quota.
    #[error("authentication rejected ({status})")]
    Auth { status: StatusCode },
    #[error("unexpected http status {status}")]
    Http { status: StatusCode },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Parse(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotConfigured
            | FetchError::RateLimited
            | FetchError::Auth { .. }
            | FetchError::Parse(_) => false,
            FetchError::Http { status } => status.is_server_error(),
            FetchError::Transport(_) => true,
        }
    }
}

/// Map a non-success response to the matching error class.
pub(crate) fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Auth { status }),
        _ => Err(FetchError::Http { status }),
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    fn source_id(&self) -> SourceId;

    fn health(&self) -> &SourceHealth;

    /// One raw fetch attempt. Retry policy lives in `fetch_with_retry`.
    async fn fetch_posts(
        &self,
        since: DateTime<Utc>,
        max_posts: usize,
    ) -> Result<Vec<RawPost>, FetchError>;

    /// Cheap reachability probe, used for recovery detection.
    async fn health_check(&self) -> bool;

    fn status(&self) -> DataSourceStatus {
        self.health().status(self.source_id())
    }
}

/// Retry wrapper used by the aggregator: transient failures back off and
/// try again, everything else fails the source for this cycle. Success and
/// failure both update the adapter's health state.
pub async fn fetch_with_retry(
    source: &dyn DataSource,
    since: DateTime<Utc>,
    max_posts: usize,
) -> Result<Vec<RawPost>, FetchError> {
    let id = source.source_id();
    let mut attempt = 0u32;
    loop {
        match source.fetch_posts(since, max_posts).await {
            Ok(posts) => {
                source.health().mark_success();
                return Ok(posts);
            }
            Err(e) if e.is_retryable() && attempt < MAX_TRANSIENT_RETRIES => {
                attempt += 1;
                let backoff = Duration::from_millis(500 * u64::from(1u32 << attempt));
                tracing::warn!(
                    source = %id,
                    attempt,
                    error = %e,
                    "transient fetch error, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                source.health().mark_error(e.to_string());
                metrics::counter!("sentiment_source_fetch_errors_total", "source" => id.as_str())
                    .increment(1);
                tracing::warn!(source = %id, error = %e, "source failed for this cycle");
                return Err(e);
            }
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    available: Option<bool>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shared per-adapter availability record. `available` starts unset so a
/// first-ever success does not register as a recovery.
#[derive(Debug, Default)]
pub struct SourceHealth {
    inner: Mutex<HealthState>,
}

impl SourceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_success(&self) {
        let mut st = self.inner.lock().expect("source health mutex poisoned");
        st.available = Some(true);
        st.last_success = Some(Utc::now());
        st.last_error = None;
    }

    pub fn mark_error(&self, message: String) {
        let mut st = self.inner.lock().expect("source health mutex poisoned");
        st.available = Some(false);
        st.last_error = Some(message);
    }

    /// True when the previous cycle left this source unavailable.
    pub fn was_unavailable(&self) -> bool {
        let st = self.inner.lock().expect("source health mutex poisoned");
        st.available == Some(false)
    }

    pub fn status(&self, source_id: SourceId) -> DataSourceStatus {
        let st = self.inner.lock().expect("source health mutex poisoned");
        DataSourceStatus {
            source_id,
            status: if st.available == Some(true) {
                SourceAvailability::Available
            } else {
                SourceAvailability::Unavailable
            },
            last_success: st.last_success,
            error_message: st.last_error.clone(),
        }
    }
}

/// The production wiring: all five feeds.
pub fn all_sources(creds: &SourceCredentials) -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(twitter::TwitterSource::new(creds)),
        Arc::new(reddit::RedditSource::new(creds)),
        Arc::new(mastodon::MastodonSource::new(creds)),
        Arc::new(nu_rss::NuRssSource::new(creds)),
        Arc::new(tweakers::TweakersSource::new(creds)),
    ]
}

/// Shared HTTP client: short timeout so one stuck upstream cannot stall a
/// whole cycle.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

/// Normalize feed text: entity decode, tag strip, quote fold, whitespace
/// collapse, length cap.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }
    out
}

/// RSS `pubDate` parsing. Feeds publish RFC 2822 timestamps.
pub(crate) fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    use time::format_description::well_known::Rfc2822;
    let parsed = time::OffsetDateTime::parse(ts, &Rfc2822).ok()?;
    DateTime::from_timestamp(parsed.unix_timestamp(), 0)
}

/// Replace HTML-only entities that would break strict XML parsing.
pub(crate) fn scrub_xml_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Deterministic post id for feeds without stable native ids.
pub fn hashed_id(source: SourceId, seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut hex = String::with_capacity(12);
    for byte in &digest[..6] {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("{}_{hex}", source.as_str())
}

// Brede zorg-termen; de topic-taxonomie verfijnt dit later per onderwerp.
const HEALTHCARE_TERMS: &[&str] = &[
    "zorg",
    "ziekenhuis",
    "huisarts",
    "ggz",
    "zorgverzekering",
    "verzekeraar",
    "wachtlijst",
    "wachttijd",
    "patiënt",
    "patient",
    "verpleeg",
    "medicijn",
    "apotheek",
    "behandeling",
    "spoedeisende",
    "dokter",
    "arts",
    "mantelzorg",
    "thuiszorg",
    "eigen risico",
    "zorgpremie",
    "umc",
];

/// Coarse healthcare prefilter for feeds that are not already scoped by
/// their query (Reddit, RSS).
pub fn is_healthcare_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    HEALTHCARE_TERMS.iter().any(|term| lower.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "<p>Lange&nbsp;wachttijden&hellip;</p>\n\n<b>bij de huisarts</b>";
        assert_eq!(normalize_text(s), "Lange wachttijden… bij de huisarts");
    }

    #[test]
    fn normalize_folds_quotes_and_whitespace() {
        let s = "  \u{201C}zorg\u{201D}   is \u{2019}duur\u{2019}  ";
        assert_eq!(normalize_text(s), "\"zorg\" is 'duur'");
    }

    #[test]
    fn hashed_id_is_stable_and_prefixed() {
        let a = hashed_id(SourceId::Tweakers, "https://example.org/item/1");
        let b = hashed_id(SourceId::Tweakers, "https://example.org/item/1");
        let c = hashed_id(SourceId::Tweakers, "https://example.org/item/2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("tweakers_"));
        assert_eq!(a.len(), "tweakers_".len() + 12);
    }

    #[test]
    fn healthcare_filter_matches_dutch_terms() {
        assert!(is_healthcare_related("De wachtlijst bij het ziekenhuis groeit"));
        assert!(is_healthcare_related("Mijn ZORGVERZEKERING wordt duurder"));
        assert!(!is_healthcare_related("De trein naar Utrecht had vertraging"));
    }

    #[test]
    fn retryability_classification() {
        assert!(!FetchError::RateLimited.is_retryable());
        assert!(!FetchError::Auth {
            status: StatusCode::UNAUTHORIZED
        }
        .is_retryable());
        assert!(FetchError::Http {
            status: StatusCode::BAD_GATEWAY
        }
        .is_retryable());
        assert!(!FetchError::Http {
            status: StatusCode::NOT_FOUND
        }
        .is_retryable());
    }

    #[test]
    fn health_state_transitions() {
        let health = SourceHealth::new();
        let st = health.status(SourceId::Twitter);
        assert_eq!(st.status, SourceAvailability::Unavailable);
        assert!(!health.was_unavailable());

        health.mark_success();
        let st = health.status(SourceId::Twitter);
        assert_eq!(st.status, SourceAvailability::Available);
        assert!(st.last_success.is_some());
        assert!(st.error_message.is_none());

        health.mark_error("boom".into());
        assert!(health.was_unavailable());
        let st = health.status(SourceId::Twitter);
        assert_eq!(st.status, SourceAvailability::Unavailable);
        assert_eq!(st.error_message.as_deref(), Some("boom"));
    }
}
