//! Nu.nl RSS adapter: Dutch general-news items, healthcare-filtered.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::config::SourceCredentials;
use crate::sources::{
    check_status, hashed_id, http_client, normalize_text, parse_rfc2822, scrub_xml_entities,
    DataSource, FetchError, SourceHealth,
};
use crate::types::{RawPost, SourceId};

const RELEVANT_TERMS: &[&str] = &[
    "zorg",
    "gezondheid",
    "ziekenhuis",
    "dokter",
    "arts",
    "patiënt",
    "behandel",
    "medisch",
];

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

pub struct NuRssSource {
    feed_url: String,
    client: reqwest::Client,
    health: SourceHealth,
}

impl NuRssSource {
    pub fn new(creds: &SourceCredentials) -> Self {
        Self {
            feed_url: creds.nu_rss_url.clone(),
            client: http_client(),
            health: SourceHealth::new(),
        }
    }
}

/// Parse a Nu.nl feed into posts: items need a title and a parseable
/// pubDate, must fall inside the window and must mention healthcare.
pub fn parse_feed(
    xml: &str,
    since: DateTime<Utc>,
    max_posts: usize,
) -> Result<Vec<RawPost>, FetchError> {
    let cleaned = scrub_xml_entities(xml);
    let rss: Rss = from_str(&cleaned).context("parsing nu.nl rss xml")?;

    let mut posts = Vec::new();
    for item in rss.channel.item {
        if posts.len() >= max_posts {
            break;
        }
        let Some(title) = item.title.as_deref().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        let Some(created_at) = item.pub_date.as_deref().and_then(parse_rfc2822) else {
            continue;
        };
        if created_at < since {
            continue;
        }

        let description = item.description.as_deref().unwrap_or_default();
        let haystack = format!("{title} {description}").to_lowercase();
        if !RELEVANT_TERMS.iter().any(|term| haystack.contains(term)) {
            continue;
        }

        let text = normalize_text(&format!("{title}. {description}"));
        if text.is_empty() {
            continue;
        }
        let seed = item.link.as_deref().unwrap_or(title);
        posts.push(RawPost {
            id: hashed_id(SourceId::RssNuml, seed),
            source: SourceId::RssNuml,
            text,
            author: None,
            created_at,
            url: item.link.clone(),
        });
    }
    Ok(posts)
}

#[async_trait]
impl DataSource for NuRssSource {
    fn source_id(&self) -> SourceId {
        SourceId::RssNuml
    }

    fn health(&self) -> &SourceHealth {
        &self.health
    }

    async fn fetch_posts(
        &self,
        since: DateTime<Utc>,
        max_posts: usize,
    ) -> Result<Vec<RawPost>, FetchError> {
        let resp = self.client.get(&self.feed_url).send().await?;
        let resp = check_status(resp)?;
        let xml = resp.text().await?;
        parse_feed(&xml, since, max_posts)
    }

    async fn health_check(&self) -> bool {
        match self.client.head(&self.feed_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "nu.nl health check failed");
                false
            }
        }
    }
}
