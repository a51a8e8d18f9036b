//! Twitter/X adapter: recent-search over Dutch healthcare terms.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::SourceCredentials;
use crate::sources::{check_status, http_client, DataSource, FetchError, SourceHealth};
use crate::types::{RawPost, SourceId};

const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
// lang:nl scopes the query server-side; the analyzer still verifies.
const QUERY: &str = "zorg OR gezondheidszorg OR #zorg lang:nl";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: DateTime<Utc>,
    author_id: Option<String>,
}

pub struct TwitterSource {
    bearer_token: Option<String>,
    client: reqwest::Client,
    health: SourceHealth,
}

impl TwitterSource {
    pub fn new(creds: &SourceCredentials) -> Self {
        if creds.twitter_bearer_token.is_none() {
            tracing::warn!("twitter bearer token not configured, source will sit out");
        }
        Self {
            bearer_token: creds.twitter_bearer_token.clone(),
            client: http_client(),
            health: SourceHealth::new(),
        }
    }
}

pub(crate) fn parse_search_response(raw: &str) -> Result<Vec<RawPost>, FetchError> {
    let body: SearchResponse =
        serde_json::from_str(raw).context("parsing twitter search response")?;
    Ok(body
        .data
        .into_iter()
        .map(|tweet| RawPost {
            id: format!("twitter_{}", tweet.id),
            source: SourceId::Twitter,
            url: Some(format!("https://twitter.com/i/web/status/{}", tweet.id)),
            text: tweet.text,
            author: tweet.author_id,
            created_at: tweet.created_at,
        })
        .collect())
}

#[async_trait]
impl DataSource for TwitterSource {
    fn source_id(&self) -> SourceId {
        SourceId::Twitter
    }

    fn health(&self) -> &SourceHealth {
        &self.health
    }

    async fn fetch_posts(
        &self,
        since: DateTime<Utc>,
        max_posts: usize,
    ) -> Result<Vec<RawPost>, FetchError> {
        let Some(token) = &self.bearer_token else {
            return Err(FetchError::NotConfigured);
        };
        // recent-search accepts 10..=100 results per page
        let max_results = max_posts.clamp(10, 100);
        let params = [
            ("query", QUERY.to_string()),
            ("max_results", max_results.to_string()),
            (
                "start_time",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("tweet.fields", "created_at,author_id".to_string()),
        ];

        let resp = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        let resp = check_status(resp)?;
        let raw = resp.text().await?;
        parse_search_response(&raw)
    }

    async fn health_check(&self) -> bool {
        let Some(token) = &self.bearer_token else {
            return false;
        };
        let probe = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&[("query", "zorg"), ("max_results", "10")])
            .send()
            .await;
        match probe {
            // 429 still proves the credentials and the API work
            Ok(resp) => {
                resp.status().is_success() || resp.status() == StatusCode::TOO_MANY_REQUESTS
            }
            Err(e) => {
                tracing::warn!(error = %e, "twitter health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tweets_with_prefixed_ids() {
        let raw = r#"{
            "data": [
                {
                    "id": "1844001",
                    "text": "De wachtlijsten in de zorg worden steeds langer",
                    "created_at": "2025-10-08T14:12:00Z",
                    "author_id": "99"
                }
            ]
        }"#;
        let posts = parse_search_response(raw).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "twitter_1844001");
        assert_eq!(posts[0].source, SourceId::Twitter);
        assert_eq!(posts[0].author.as_deref(), Some("99"));
        assert_eq!(
            posts[0].url.as_deref(),
            Some("https://twitter.com/i/web/status/1844001")
        );
    }

    #[test]
    fn empty_result_set_is_no_posts() {
        let posts = parse_search_response(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn garbage_body_is_a_parse_error() {
        let err = parse_search_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
        assert!(!err.is_retryable());
    }
}
