//! Podcast discovery and episode normalization.
//!
//! Shows are configured by name. [`ItunesDirectory`] resolves a name to its
//! RSS feed through the iTunes search API and reads the newest episodes from
//! that feed.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::http::send_with_retry;
use crate::models::{ContentDocument, Episode, SourceType};

use super::rss::parse_feed;

const SERVICE: &str = "itunes";
const UNTITLED: &str = "Untitled Episode";

#[async_trait]
pub trait PodcastDirectory: Send + Sync {
    /// RSS feed URL for a show, `None` when the directory does not know it.
    async fn find_feed(&self, show: &str) -> Result<Option<String>>;

    /// Up to `limit` of the newest episodes in a feed.
    async fn episodes(&self, feed_url: &str, limit: usize) -> Result<Vec<Episode>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "feedUrl")]
    feed_url: Option<String>,
}

pub struct ItunesDirectory {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl ItunesDirectory {
    pub fn new(base_url: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }
}

#[async_trait]
impl PodcastDirectory for ItunesDirectory {
    async fn find_feed(&self, show: &str) -> Result<Option<String>> {
        let url = format!("{}/search", self.base_url);
        let response = send_with_retry(SERVICE, self.max_retries, || {
            self.client
                .get(&url)
                .query(&[("term", show), ("entity", "podcast"), ("limit", "1")])
                .send()
        })
        .await?;

        let body: SearchResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .next()
            .and_then(|r| r.feed_url)
            .filter(|u| !u.is_empty()))
    }

    async fn episodes(&self, feed_url: &str, limit: usize) -> Result<Vec<Episode>> {
        let response = send_with_retry("rss", self.max_retries, || {
            self.client.get(feed_url).send()
        })
        .await?;
        let xml = response.text().await?;
        let feed = parse_feed(&xml)?;
        Ok(newest(feed.episodes, limit))
    }
}

/// Newest first by publish date; undated episodes keep feed order at the end.
pub fn newest(mut episodes: Vec<Episode>, limit: usize) -> Vec<Episode> {
    episodes.sort_by(|a, b| match (a.published, b.published) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    episodes.truncate(limit);
    episodes
}

/// Build the stored document for an episode.
///
/// The transcript is cut to `max_chars` characters; a missing or blank
/// transcript becomes `placeholder`. The full transcript is kept in
/// `raw_data` next to the feed fields.
pub fn episode_to_document(
    episode: &Episode,
    transcript: Option<&str>,
    max_chars: usize,
    placeholder: &str,
) -> ContentDocument {
    let transcript = transcript.map(str::trim).filter(|t| !t.is_empty());
    let content = match transcript {
        Some(t) => t.chars().take(max_chars).collect(),
        None => placeholder.to_string(),
    };

    let mut raw = serde_json::to_value(episode).unwrap_or(serde_json::Value::Null);
    if let (Some(map), Some(t)) = (raw.as_object_mut(), transcript) {
        map.insert("transcription".to_string(), t.into());
    }

    let mut doc = ContentDocument::new(content, SourceType::Podcast);
    doc.title = if episode.title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        episode.title.clone()
    };
    doc.source_url = episode.audio_url.clone();
    doc.description = episode.summary.clone();
    doc.author = episode.author.clone();
    doc.image_url = episode.image_url.clone();
    doc.upload_time = episode.published;
    doc.raw_data = raw;
    doc
}
