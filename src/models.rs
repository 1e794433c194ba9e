//! Core data models used throughout finsight.
//!
//! [`ContentDocument`] is the one normalized shape that flows through tagging,
//! embedding, storage and retrieval. [`Episode`] and [`NewsItem`] are the raw
//! shapes produced by the upstream feeds; they are normalized by the ingest
//! pipeline and only survive afterwards inside `raw_data`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which collection a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Podcast,
    News,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Podcast => "podcast",
            SourceType::News => "news",
        }
    }

    /// The tag vocabulary that documents of this type are tagged from.
    pub fn tag_category(&self) -> TagCategory {
        match self {
            SourceType::Podcast => TagCategory::Audio,
            SourceType::News => TagCategory::News,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "podcast" | "podcasts" => Ok(SourceType::Podcast),
            "news" => Ok(SourceType::News),
            other => Err(format!(
                "unknown source type '{}': expected podcast or news",
                other
            )),
        }
    }
}

/// A named tag vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    Audio,
    News,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Audio => "audio",
            TagCategory::News => "news",
        }
    }

    /// Upper bound on tags extracted from a single document.
    pub fn max_tags(&self) -> usize {
        match self {
            TagCategory::Audio => 30,
            TagCategory::News => 5,
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" | "podcast" | "podcasts" => Ok(TagCategory::Audio),
            "news" => Ok(TagCategory::News),
            other => Err(format!(
                "unknown tag category '{}': expected audio or news",
                other
            )),
        }
    }
}

/// How a query is mapped onto a tag vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Only tags written character-for-character in the vocabulary.
    Exact,
    /// Semantically related vocabulary tags, ranked by relevance.
    Fuzzy,
}

/// Overall sentiment reported by the news provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

/// Normalized document shared by both collections.
///
/// Optional fields default to empty values; `upload_time` is the only field
/// with a real "unknown" state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default, rename = "imageUrl")]
    pub image_url: String,
    #[serde(default)]
    pub upload_time: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque upstream payload. Never interpreted.
    #[serde(default)]
    pub raw_data: serde_json::Value,
    /// Populated after retrieval only.
    #[serde(default, rename = "aiSummary", skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
}

impl ContentDocument {
    pub fn new(content: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            content: content.into(),
            title: String::new(),
            description: String::new(),
            author: String::new(),
            source_url: String::new(),
            image_url: String::new(),
            upload_time: None,
            source_type,
            tags: Vec::new(),
            raw_data: serde_json::Value::Null,
            ai_summary: None,
            sentiment: None,
        }
    }

    /// True if any of `tags` is carried by this document.
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}

/// A podcast episode as parsed from an RSS feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub author: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub summary: String,
    pub description: String,
    pub audio_url: String,
    pub guid: String,
    pub image_url: String,
}

/// One article from the `NEWS_SENTIMENT` feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// `YYYYMMDDTHHMMSS`, UTC.
    #[serde(default)]
    pub time_published: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_domain: String,
    #[serde(default)]
    pub topics: Vec<TopicRelevance>,
    #[serde(default)]
    pub overall_sentiment_score: f64,
    #[serde(default)]
    pub overall_sentiment_label: String,
    #[serde(default)]
    pub ticker_sentiment: Vec<TickerSentiment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicRelevance {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub relevance_score: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerSentiment {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub relevance_score: String,
    #[serde(default)]
    pub ticker_sentiment_score: String,
    #[serde(default)]
    pub ticker_sentiment_label: String,
}
