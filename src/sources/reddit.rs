//! Reddit adapter: OAuth2 client-credentials flow over Dutch subreddits.
//!
//! The listing endpoint is not healthcare-scoped, so posts pass the shared
//! keyword prefilter before they count.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::SourceCredentials;
use crate::sources::{
    check_status, http_client, is_healthcare_related, DataSource, FetchError, SourceHealth,
};
use crate::types::{RawPost, SourceId};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
// Bredere selectie: algemeen NL plus zorg- en GGZ-subreddits.
const SUBREDDITS: &str =
    "thenetherlands+gezondheid+hulpdiensten+verzekeringen+zorgverzekering+GGZ+mentalhealth";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    created_utc: f64,
    permalink: String,
}

pub struct RedditSource {
    client_id: Option<String>,
    client_secret: Option<String>,
    user_agent: String,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    health: SourceHealth,
}

impl RedditSource {
    pub fn new(creds: &SourceCredentials) -> Self {
        if creds.reddit_client_id.is_none() || creds.reddit_client_secret.is_none() {
            tracing::warn!("reddit credentials not configured, source will sit out");
        }
        Self {
            client_id: creds.reddit_client_id.clone(),
            client_secret: creds.reddit_client_secret.clone(),
            user_agent: creds.reddit_user_agent.clone(),
            client: http_client(),
            token: Mutex::new(None),
            health: SourceHealth::new(),
        }
    }

    /// Reuse the cached token until one minute before expiry, then refresh
    /// via the client-credentials grant.
    async fn ensure_access_token(&self) -> Result<String, FetchError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret)
        else {
            return Err(FetchError::NotConfigured);
        };

        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = self
            .client
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let resp = check_status(resp)?;
        let raw = resp.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&raw).context("parsing reddit token response")?;

        let expires_at =
            Utc::now() + chrono::Duration::seconds(token.expires_in.saturating_sub(60) as i64);
        *slot = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        tracing::info!("reddit access token refreshed");
        Ok(token.access_token)
    }
}

pub(crate) fn parse_listing(
    raw: &str,
    since: DateTime<Utc>,
) -> Result<Vec<RawPost>, FetchError> {
    let listing: Listing = serde_json::from_str(raw).context("parsing reddit listing")?;
    let posts = listing
        .data
        .children
        .into_iter()
        .filter_map(|child| {
            let post = child.data;
            let created_at = DateTime::from_timestamp(post.created_utc as i64, 0)?;
            if created_at < since {
                return None;
            }
            let text = format!("{} {}", post.title, post.selftext).trim().to_string();
            if !is_healthcare_related(&text) {
                return None;
            }
            Some(RawPost {
                id: format!("reddit_{}", post.id),
                source: SourceId::Reddit,
                url: Some(format!("https://reddit.com{}", post.permalink)),
                text,
                author: post.author,
                created_at,
            })
        })
        .collect();
    Ok(posts)
}

#[async_trait]
impl DataSource for RedditSource {
    fn source_id(&self) -> SourceId {
        SourceId::Reddit
    }

    fn health(&self) -> &SourceHealth {
        &self.health
    }

    async fn fetch_posts(
        &self,
        since: DateTime<Utc>,
        max_posts: usize,
    ) -> Result<Vec<RawPost>, FetchError> {
        let token = self.ensure_access_token().await?;
        let limit = max_posts.min(100);
        let url = format!("https://oauth.reddit.com/r/{SUBREDDITS}/new?limit={limit}");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let resp = check_status(resp)?;
        let raw = resp.text().await?;
        parse_listing(&raw, since)
    }

    async fn health_check(&self) -> bool {
        match self.ensure_access_token().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "reddit health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing_with(posts: &str) -> String {
        format!(r#"{{"data": {{"children": [{posts}]}}}}"#)
    }

    fn child(id: &str, title: &str, created_utc: i64) -> String {
        format!(
            r#"{{"data": {{"id": "{id}", "title": "{title}", "selftext": "", "author": "tester", "created_utc": {created_utc}, "permalink": "/r/thenetherlands/{id}"}}}}"#
        )
    }

    #[test]
    fn keeps_healthcare_posts_after_since() {
        let since = Utc.with_ymd_and_hms(2025, 10, 8, 12, 0, 0).unwrap();
        let fresh = since.timestamp() + 600;
        let raw = listing_with(&format!(
            "{},{}",
            child("aa1", "De zorgverzekering wordt weer duurder", fresh),
            child("aa2", "Mooie fietsroute door Drenthe", fresh)
        ));
        let posts = parse_listing(&raw, since).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "reddit_aa1");
        assert_eq!(posts[0].url.as_deref(), Some("https://reddit.com/r/thenetherlands/aa1"));
    }

    #[test]
    fn drops_posts_older_than_since() {
        let since = Utc.with_ymd_and_hms(2025, 10, 8, 12, 0, 0).unwrap();
        let stale = since.timestamp() - 600;
        let raw = listing_with(&child("old1", "Wachtlijst in het ziekenhuis", stale));
        let posts = parse_listing(&raw, since).unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn empty_listing_is_fine() {
        let posts = parse_listing(
            r#"{"data": {"children": []}}"#,
            Utc.with_ymd_and_hms(2025, 10, 8, 12, 0, 0).unwrap(),
        )
        .unwrap();
        assert!(posts.is_empty());
    }
}
