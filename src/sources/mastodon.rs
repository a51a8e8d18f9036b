//! Mastodon adapter: v2 status search on a (by default Dutch) instance.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::SourceCredentials;
use crate::sources::{
    check_status, http_client, normalize_text, DataSource, FetchError, SourceHealth,
};
use crate::types::{RawPost, SourceId};

const QUERY: &str = "zorg OR gezondheidszorg OR ziekenhuis OR huisarts OR verzekering OR \
                     wachttijd OR GGZ OR patiënt OR verpleging OR ouderenzorg OR medicijn OR \
                     apotheek OR thuiszorg OR dokter OR arts OR \"mentale gezondheid\" OR \
                     behandeling";

// De zoek-API levert maximaal 40 statussen per pagina.
const PAGE_LIMIT: usize = 40;

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    statuses: Vec<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    content: String,
    created_at: DateTime<Utc>,
    account: Account,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: String,
}

pub struct MastodonSource {
    instance_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
    health: SourceHealth,
}

impl MastodonSource {
    pub fn new(creds: &SourceCredentials) -> Self {
        if creds.mastodon_access_token.is_none() {
            tracing::warn!("mastodon access token not configured, source will sit out");
        }
        Self {
            instance_url: creds.mastodon_instance_url.trim_end_matches('/').to_string(),
            access_token: creds.mastodon_access_token.clone(),
            client: http_client(),
            health: SourceHealth::new(),
        }
    }
}

/// Snowflake ids are time-ordered; a microsecond timestamp makes a usable
/// `since_id` lower bound.
fn since_id_for(since: DateTime<Utc>) -> String {
    (since.timestamp_millis().max(0) * 1000).to_string()
}

pub(crate) fn parse_statuses(raw: &str) -> Result<Vec<RawPost>, FetchError> {
    let result: SearchResult =
        serde_json::from_str(raw).context("parsing mastodon search response")?;
    Ok(result
        .statuses
        .into_iter()
        .map(|status| RawPost {
            id: format!("mastodon_{}", status.id),
            source: SourceId::Mastodon,
            // statussen zijn HTML; platstrijken voor de analyzer
            text: normalize_text(&status.content),
            author: Some(status.account.username),
            created_at: status.created_at,
            url: status.url,
        })
        .collect())
}

#[async_trait]
impl DataSource for MastodonSource {
    fn source_id(&self) -> SourceId {
        SourceId::Mastodon
    }

    fn health(&self) -> &SourceHealth {
        &self.health
    }

    async fn fetch_posts(
        &self,
        since: DateTime<Utc>,
        max_posts: usize,
    ) -> Result<Vec<RawPost>, FetchError> {
        let Some(token) = &self.access_token else {
            return Err(FetchError::NotConfigured);
        };
        let params = [
            ("q", QUERY.to_string()),
            ("type", "statuses".to_string()),
            ("limit", max_posts.min(PAGE_LIMIT).to_string()),
            ("since_id", since_id_for(since)),
        ];

        let resp = self
            .client
            .get(format!("{}/api/v2/search", self.instance_url))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        let resp = check_status(resp)?;
        let raw = resp.text().await?;
        parse_statuses(&raw)
    }

    async fn health_check(&self) -> bool {
        let Some(token) = &self.access_token else {
            return false;
        };
        let probe = self
            .client
            .get(format!("{}/api/v1/instance", self.instance_url))
            .bearer_auth(token)
            .send()
            .await;
        match probe {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "mastodon health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn strips_status_html() {
        let raw = r#"{
            "statuses": [
                {
                    "id": "113546",
                    "content": "<p>De huisarts had <b>eindelijk</b> weer plek</p>",
                    "created_at": "2025-10-08T09:30:00.000Z",
                    "account": {"username": "jansen"},
                    "url": "https://mastodon.nl/@jansen/113546"
                }
            ]
        }"#;
        let posts = parse_statuses(raw).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "mastodon_113546");
        assert_eq!(posts[0].text, "De huisarts had eindelijk weer plek");
        assert_eq!(posts[0].author.as_deref(), Some("jansen"));
    }

    #[test]
    fn since_id_is_microseconds() {
        let since = Utc.with_ymd_and_hms(2025, 10, 8, 12, 0, 0).unwrap();
        assert_eq!(since_id_for(since), (since.timestamp_millis() * 1000).to_string());
    }

    #[test]
    fn missing_statuses_field_is_empty() {
        let posts = parse_statuses(r#"{"accounts": [], "hashtags": []}"#).unwrap();
        assert!(posts.is_empty());
    }
}
