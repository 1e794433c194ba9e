//! Deterministic doubles for every upstream the pipeline talks to.
//!
//! The fake LLM reads the same delimited prompt sections the real prompts
//! use and answers from a small keyword list, so tests can reason about
//! which tags and tickers come back.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use finsight::config::Config;
use finsight::embedding::EmbeddingProvider;
use finsight::error::{Error, Result};
use finsight::ingest::Sources;
use finsight::llm::{JsonRequest, LlmClient, TextRequest};
use finsight::models::{Episode, NewsItem};
use finsight::service::{Clients, QueryService};
use finsight::sources::{NewsFeed, PodcastDirectory};
use finsight::store::InMemoryStore;
use finsight::transcribe::Transcriber;

/// Tags the fake model recognizes, in canonical spelling.
pub const KEYWORDS: &[&str] = &[
    "Apple",
    "Tesla",
    "Microsoft",
    "Bonds",
    "Inflation",
    "Bitcoin",
    "Interest Rates",
];

/// Content containing this marker makes the fake model fail.
pub const LLM_DOWN: &str = "LLM_DOWN";

fn section<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    prompt
        .split_once(start)
        .and_then(|(_, rest)| rest.split_once(end))
        .map(|(inner, _)| inner.trim())
        .unwrap_or("")
}

fn keywords_in(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|k| lower.contains(&k.to_lowercase()))
        .map(|k| k.to_string())
        .collect()
}

#[derive(Default)]
pub struct FakeLlm {
    pub json_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete_json(&self, request: JsonRequest) -> Result<Value> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.prompt.as_str();

        match request.name.as_str() {
            "document_tags" => {
                let text = section(prompt, "---TEXT_START---", "---TEXT_END---");
                if text.contains(LLM_DOWN) {
                    return Err(Error::upstream("fake-llm", "service unavailable"));
                }
                Ok(json!({ "tags": keywords_in(text) }))
            }
            "query_tags_exact" => {
                let query = section(prompt, "---QUERY_START---", "---QUERY_END---");
                let vocab = section(prompt, "---TAGS_START---", "---TAGS_END---");
                let mut tags: Vec<String> = vocab
                    .split(", ")
                    .filter(|t| !t.is_empty() && query.contains(*t))
                    .map(str::to_string)
                    .collect();
                // Real models embellish; these must be filtered out.
                tags.push("Apple (AAPL)".to_string());
                tags.push("Stock Prices".to_string());
                Ok(json!({ "tags": tags }))
            }
            "query_tags_fuzzy" => {
                let query = section(prompt, "---QUERY_START---", "---QUERY_END---").to_lowercase();
                let vocab = section(prompt, "---TAGS_START---", "---TAGS_END---");
                let mut tags: Vec<String> = vocab
                    .split(", ")
                    .filter(|t| !t.is_empty() && query.contains(&t.to_lowercase()))
                    .map(|t| t.to_uppercase())
                    .collect();
                tags.push("Invented Theme".to_string());
                Ok(json!({ "tags": tags }))
            }
            "sentiment_tickers" => {
                let query = prompt.rsplit("Query: ").next().unwrap_or("").to_lowercase();
                let mut tickers = Vec::new();
                if query.contains("apple") {
                    tickers.push("aapl");
                }
                if query.contains("tesla") {
                    tickers.push("TSLA");
                }
                Ok(json!({ "tickers": tickers.join(", ") }))
            }
            "chart_symbols" => {
                let query = prompt.rsplit("Query: ").next().unwrap_or("").to_lowercase();
                if query.contains("apple") {
                    Ok(json!({ "stockSymbols": [["NASDAQ:AAPL"], ["bad symbol"]] }))
                } else {
                    Ok(json!({ "stockSymbols": [] }))
                }
            }
            other => Err(Error::contract("fake-llm", format!("unexpected request {}", other))),
        }
    }

    async fn complete_text(&self, _request: TextRequest) -> Result<String> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok("Discusses the topic directly.".to_string())
    }
}

/// Bag-of-keywords embedder: one dimension per keyword plus a constant.
pub struct KeywordEmbedder {
    fail_on: Option<String>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self { fail_on: None }
    }

    /// Fail any batch containing `marker`.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
        }
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| lower.matches(&k.to_lowercase()).count() as f32)
        .collect();
    v.push(0.1);
    v
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(marker) = &self.fail_on {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(Error::upstream("fake-embeddings", "rate limited"));
            }
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Podcast directory backed by a map of show name → episodes. Shows mapped
/// to `Err` fail at fetch time.
#[derive(Default)]
pub struct FakeDirectory {
    shows: HashMap<String, std::result::Result<Vec<Episode>, String>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(mut self, name: &str, episodes: Vec<Episode>) -> Self {
        self.shows.insert(name.to_string(), Ok(episodes));
        self
    }

    pub fn broken(mut self, name: &str) -> Self {
        self.shows.insert(name.to_string(), Err("feed unreachable".to_string()));
        self
    }
}

#[async_trait]
impl PodcastDirectory for FakeDirectory {
    async fn find_feed(&self, show: &str) -> Result<Option<String>> {
        Ok(self
            .shows
            .contains_key(show)
            .then(|| format!("fake://{}", show)))
    }

    async fn episodes(&self, feed_url: &str, limit: usize) -> Result<Vec<Episode>> {
        let show = feed_url.trim_start_matches("fake://");
        match self.shows.get(show) {
            Some(Ok(episodes)) => Ok(episodes.iter().take(limit).cloned().collect()),
            Some(Err(msg)) => Err(Error::upstream("fake-rss", msg.clone())),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
pub struct FakeNews {
    topics: HashMap<String, std::result::Result<Vec<NewsItem>, String>>,
    pub live: Vec<NewsItem>,
    pub ticker_requests: Mutex<Vec<String>>,
}

impl FakeNews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, topic: &str, items: Vec<NewsItem>) -> Self {
        self.topics.insert(topic.to_string(), Ok(items));
        self
    }

    pub fn broken(mut self, topic: &str) -> Self {
        self.topics
            .insert(topic.to_string(), Err("quota exceeded".to_string()));
        self
    }

    pub fn live(mut self, items: Vec<NewsItem>) -> Self {
        self.live = items;
        self
    }
}

#[async_trait]
impl NewsFeed for FakeNews {
    async fn by_topics(&self, topics: &str, limit: usize) -> Result<Vec<NewsItem>> {
        match self.topics.get(topics) {
            Some(Ok(items)) => Ok(items.iter().take(limit).cloned().collect()),
            Some(Err(msg)) => Err(Error::upstream("fake-news", msg.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn by_tickers(&self, tickers: &str, limit: usize) -> Result<Vec<NewsItem>> {
        if let Ok(mut seen) = self.ticker_requests.lock() {
            seen.push(tickers.to_string());
        }
        Ok(self.live.iter().take(limit).cloned().collect())
    }
}

/// Transcribes every URL to a fixed text, or to whatever was registered.
#[derive(Default)]
pub struct FakeTranscriber {
    texts: HashMap<String, String>,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl FakeTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, url: &str, text: &str) -> Self {
        self.texts.insert(url.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio_urls: &[String]) -> Result<HashMap<String, String>> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(audio_urls.to_vec());
        }
        Ok(audio_urls
            .iter()
            .filter_map(|u| self.texts.get(u).map(|t| (u.clone(), t.clone())))
            .collect())
    }
}

pub fn episode(title: &str, url: &str) -> Episode {
    Episode {
        title: title.to_string(),
        audio_url: url.to_string(),
        summary: format!("Summary of {}", title),
        ..Episode::default()
    }
}

pub fn news_item(title: &str, url: &str, summary: &str) -> NewsItem {
    NewsItem {
        title: title.to_string(),
        url: url.to_string(),
        summary: summary.to_string(),
        time_published: "20240502T203000".to_string(),
        source: "Reuters".to_string(),
        overall_sentiment_label: "Neutral".to_string(),
        ..NewsItem::default()
    }
}

/// A fully faked service plus handles to the doubles.
pub struct Harness {
    pub service: QueryService,
    pub store: Arc<InMemoryStore>,
    pub llm: Arc<FakeLlm>,
    pub news: Arc<FakeNews>,
    pub transcriber: Arc<FakeTranscriber>,
}

pub fn harness(
    config: Config,
    directory: FakeDirectory,
    news: FakeNews,
    transcriber: FakeTranscriber,
    embedder: KeywordEmbedder,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(FakeLlm::new());
    let news = Arc::new(news);
    let transcriber = Arc::new(transcriber);

    let clients = Clients {
        llm: llm.clone(),
        embedder: Arc::new(embedder),
        tags: store.clone(),
        vectors: store.clone(),
        sources: Sources {
            directory: Arc::new(directory),
            news: news.clone(),
            transcriber: transcriber.clone(),
            stager: None,
        },
    };

    Harness {
        service: QueryService::new(&config, clients),
        store,
        llm,
        news,
        transcriber,
    }
}

/// Defaults with the given shows and topics, one source at a time.
pub fn config_with(podcasts: &[&str], topics: &[&str]) -> Config {
    let mut config = Config::default();
    config.indexing.podcasts = podcasts.iter().map(|s| s.to_string()).collect();
    config.indexing.news_topics = topics.iter().map(|s| s.to_string()).collect();
    config
}
