//! alerts.rs — critical-condition webhook.
//!
//! Fires when the pipeline is in real trouble (every source down, data
//! older than an hour). Delivery is best-effort: failures are logged and
//! swallowed, never surfaced into the data path.

use std::time::Duration;

use reqwest::Client;

/// Conditions that warrant waking someone up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    AllSourcesUnavailable,
    DataStale,
}

impl AlertKind {
    fn as_str(&self) -> &'static str {
        match self {
            AlertKind::AllSourcesUnavailable => "all_sources_unavailable",
            AlertKind::DataStale => "data_stale",
        }
    }
}

pub struct AlertWebhook {
    webhook_url: Option<String>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl AlertWebhook {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Post one alert; bounded retries, all failures swallowed.
    pub async fn notify(&self, kind: AlertKind, message: &str) {
        let Some(url) = &self.webhook_url else {
            tracing::debug!(alert = kind.as_str(), "alert webhook disabled");
            return;
        };

        let body = serde_json::json!({
            "service": "zorg-sentiment",
            "alert": kind.as_str(),
            "message": message,
            "at": chrono::Utc::now().to_rfc3339(),
        });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(resp) if resp.status().is_success() => {
                    metrics::counter!("sentiment_alerts_sent_total").increment(1);
                    tracing::info!(alert = kind.as_str(), "critical alert delivered");
                    return;
                }
                Ok(resp) => {
                    tracing::warn!(
                        alert = kind.as_str(),
                        status = %resp.status(),
                        attempt,
                        "alert webhook rejected payload"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        alert = kind.as_str(),
                        error = %e,
                        attempt,
                        "alert webhook unreachable"
                    );
                }
            }

            if attempt > self.max_retries {
                // give up quietly; alerting must never hurt the data path
                return;
            }
            tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
        }
    }
}
