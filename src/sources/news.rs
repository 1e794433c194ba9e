//! Alpha Vantage `NEWS_SENTIMENT` feed.
//!
//! Indexing pulls articles by topic; the live news query pulls the latest
//! articles for a ticker list. Both return raw [`NewsItem`]s, normalized with
//! [`news_to_document`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::config::NewsConfig;
use crate::error::{credential, Error, Result};
use crate::http::send_with_retry;
use crate::models::{ContentDocument, NewsItem, Sentiment, SourceType};

const SERVICE: &str = "alphavantage";

#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Articles for one or more comma-separated topics, e.g. `"technology,ipo"`.
    async fn by_topics(&self, topics: &str, limit: usize) -> Result<Vec<NewsItem>>;

    /// Latest articles mentioning any of the comma-separated tickers.
    async fn by_tickers(&self, tickers: &str, limit: usize) -> Result<Vec<NewsItem>>;
}

pub struct AlphaVantage {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl AlphaVantage {
    pub fn new(config: &NewsConfig, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    async fn query(&self, filter: (&str, &str), limit: usize) -> Result<Vec<NewsItem>> {
        let api_key = credential("ALPHA_VANTAGE_API_KEY")?;
        let url = format!("{}/query", self.base_url);
        let limit = limit.to_string();

        let response = send_with_retry(SERVICE, self.max_retries, || {
            self.client
                .get(&url)
                .query(&[
                    ("function", "NEWS_SENTIMENT"),
                    filter,
                    ("sort", "LATEST"),
                    ("limit", limit.as_str()),
                    ("apikey", api_key.as_str()),
                ])
                .send()
        })
        .await?;

        let body: Value = response.json().await?;
        parse_feed_response(body)
    }
}

#[async_trait]
impl NewsFeed for AlphaVantage {
    async fn by_topics(&self, topics: &str, limit: usize) -> Result<Vec<NewsItem>> {
        self.query(("topics", topics), limit).await
    }

    async fn by_tickers(&self, tickers: &str, limit: usize) -> Result<Vec<NewsItem>> {
        self.query(("tickers", tickers), limit).await
    }
}

/// Alpha Vantage answers 200 even for quota and key errors; those come back
/// as an `Information`, `Note` or `Error Message` field instead of `feed`.
fn parse_feed_response(mut body: Value) -> Result<Vec<NewsItem>> {
    if let Some(feed) = body.get_mut("feed").map(Value::take) {
        return Ok(serde_json::from_value(feed)?);
    }

    for key in ["Information", "Note", "Error Message"] {
        if let Some(msg) = body.get(key).and_then(|m| m.as_str()) {
            return Err(Error::upstream(SERVICE, msg.to_string()));
        }
    }

    Err(Error::contract(SERVICE, "response has no feed"))
}

/// Parse `YYYYMMDDTHHMMSS` (seconds optional), UTC.
pub fn parse_time_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&format!("{}00", s), "%Y%m%dT%H%M%S"))
        .ok()
        .map(|n| n.and_utc())
}

/// Build the stored document for an article.
///
/// Unparseable publish times fall back to now.
pub fn news_to_document(item: &NewsItem) -> ContentDocument {
    let mut doc = ContentDocument::new(item.summary.clone(), SourceType::News);
    doc.title = item.title.clone();
    doc.source_url = item.url.clone();
    doc.description = item.summary.clone();
    doc.author = if item.authors.is_empty() {
        item.source.clone()
    } else {
        item.authors.join(", ")
    };
    doc.image_url = item.banner_image.clone().unwrap_or_default();
    doc.upload_time = Some(parse_time_published(&item.time_published).unwrap_or_else(Utc::now));
    if !item.overall_sentiment_label.is_empty() {
        doc.sentiment = Some(Sentiment {
            label: item.overall_sentiment_label.clone(),
            score: item.overall_sentiment_score,
        });
    }
    doc.raw_data = serde_json::to_value(item).unwrap_or(Value::Null);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_feed() -> Value {
        serde_json::json!({
            "items": "1",
            "feed": [{
                "title": "Apple beats estimates",
                "url": "https://news/apple",
                "time_published": "20240502T203000",
                "authors": ["Jane Doe", "John Roe"],
                "summary": "Apple reported strong iPhone sales.",
                "banner_image": null,
                "source": "Reuters",
                "topics": [{ "topic": "Earnings", "relevance_score": "0.9" }],
                "overall_sentiment_score": 0.31,
                "overall_sentiment_label": "Somewhat-Bullish",
                "ticker_sentiment": [{
                    "ticker": "AAPL",
                    "relevance_score": "0.8",
                    "ticker_sentiment_score": "0.4",
                    "ticker_sentiment_label": "Bullish"
                }]
            }]
        })
    }

    #[test]
    fn parses_time_published() {
        let t = parse_time_published("20240502T203000").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-02T20:30:00+00:00");
        assert!(parse_time_published("20240502T2030").is_some());
        assert!(parse_time_published("May 2").is_none());
    }

    #[test]
    fn normalizes_article() {
        let items = parse_feed_response(sample_feed()).unwrap();
        let doc = news_to_document(&items[0]);
        assert_eq!(doc.content, "Apple reported strong iPhone sales.");
        assert_eq!(doc.author, "Jane Doe, John Roe");
        assert_eq!(doc.image_url, "");
        assert_eq!(doc.sentiment.as_ref().unwrap().label, "Somewhat-Bullish");
        assert_eq!(doc.raw_data["source"], "Reuters");
        assert_eq!(doc.source_type, SourceType::News);
    }

    #[test]
    fn author_falls_back_to_source() {
        let item = NewsItem {
            source: "Benzinga".to_string(),
            time_published: "bad".to_string(),
            ..NewsItem::default()
        };
        let doc = news_to_document(&item);
        assert_eq!(doc.author, "Benzinga");
        assert!(doc.upload_time.is_some());
        assert!(doc.sentiment.is_none());
    }

    #[test]
    fn quota_message_is_upstream_error() {
        let err = parse_feed_response(serde_json::json!({
            "Information": "rate limit reached"
        }))
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn fetches_by_topics() {
        std::env::set_var("ALPHA_VANTAGE_API_KEY", "demo");
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "NEWS_SENTIMENT"))
            .and(query_param("topics", "earnings"))
            .and(query_param("apikey", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_feed()))
            .mount(&server)
            .await;

        let config = NewsConfig {
            base_url: server.uri(),
            ..NewsConfig::default()
        };
        let feed = AlphaVantage::new(&config, 0).unwrap();
        let items = feed.by_topics("earnings", 10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ticker_sentiment[0].ticker, "AAPL");
    }
}
