//! Tweakers RSS adapter: tech forum mix, filtered to (e-)health threads.

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

// Tech-invalshoek: e-health en digitale zorg horen er hier wel bij.
const RELEVANT_TERMS: &[&str] = &[
    "zorg",
    "gezondheid",
    "ziekenhuis",
    "e-health",
    "digitale zorg",
    "patiënt",
    "medisch",
    "ggd",
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
    author: Option<String>,
    // quick-xml strips the `dc:` namespace prefix before serde matching
    #[serde(rename = "creator")]
    creator: Option<String>,
}

pub struct TweakersSource {
    feed_url: String,
    client: reqwest::Client,
    health: SourceHealth,
}

impl TweakersSource {
    pub fn new(creds: &SourceCredentials) -> Self {
        Self {
            feed_url: creds.tweakers_rss_url.clone(),
            client: http_client(),
            health: SourceHealth::new(),
        }
    }
}

pub fn parse_feed(
    xml: &str,
    since: DateTime<Utc>,
    max_posts: usize,
) -> Result<Vec<RawPost>, FetchError> {
    let cleaned = scrub_xml_entities(xml);
    let rss: Rss = from_str(&cleaned).context("parsing tweakers rss xml")?;

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
            id: hashed_id(SourceId::Tweakers, seed),
            source: SourceId::Tweakers,
            text,
            author: item.author.clone().or_else(|| item.creator.clone()),
            created_at,
            url: item.link.clone(),
        });
    }
    Ok(posts)
}

#[async_trait]
impl DataSource for TweakersSource {
    fn source_id(&self) -> SourceId {
        SourceId::Tweakers
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
                tracing::warn!(error = %e, "tweakers health check failed");
                false
            }
        }
    }
}
