//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so an empty file is a
//! valid configuration. Credentials never live here: they are read from the
//! environment by the operation that needs them (see [`crate::error::credential`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::MatchPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub symbols: SymbolsConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub staging: Option<StagingConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/finsight.sqlite")
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            summary_model: default_summary_model(),
            base_url: default_openai_base_url(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4.1".to_string()
}
fn default_summary_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_openai_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_podcast_limit")]
    pub podcast_limit: usize,
    #[serde(default = "default_news_limit")]
    pub news_limit: usize,
    #[serde(default = "default_podcast_policy")]
    pub podcast_policy: MatchPolicy,
    #[serde(default = "default_news_policy")]
    pub news_policy: MatchPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            podcast_limit: default_podcast_limit(),
            news_limit: default_news_limit(),
            podcast_policy: default_podcast_policy(),
            news_policy: default_news_policy(),
        }
    }
}

fn default_podcast_limit() -> usize {
    2
}
fn default_news_limit() -> usize {
    5
}
fn default_podcast_policy() -> MatchPolicy {
    MatchPolicy::Exact
}
fn default_news_policy() -> MatchPolicy {
    MatchPolicy::Fuzzy
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_podcasts")]
    pub podcasts: Vec<String>,
    #[serde(default = "default_news_topics")]
    pub news_topics: Vec<String>,
    #[serde(default = "default_episodes_per_show")]
    pub episodes_per_show: usize,
    #[serde(default = "default_indexing_news_limit")]
    pub news_limit: usize,
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
    /// Transcripts longer than this are cut at a char boundary.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Stored in place of empty content so every row stays embeddable.
    #[serde(default = "default_placeholder")]
    pub empty_content_placeholder: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            podcasts: default_podcasts(),
            news_topics: default_news_topics(),
            episodes_per_show: default_episodes_per_show(),
            news_limit: default_indexing_news_limit(),
            max_concurrent_sources: default_max_concurrent_sources(),
            max_content_chars: default_max_content_chars(),
            empty_content_placeholder: default_placeholder(),
        }
    }
}

fn default_podcasts() -> Vec<String> {
    [
        "The Clark Howard Podcast",
        "Bloomberg Masters in Business Podcast",
        "Goldman Sachs Exchanges",
        "CNBC's Fast Money Podcast",
        "Real Vision",
        "The Compound and Friends",
        "Rational Reminder Podcast",
        "M&A Science",
        "Australian Finance Podcast (Rask)",
        "The Ideas Exchange by ASX",
        "We Study Billionaires",
        "Motley Fool Money",
        "Invest Like the Best",
        "Equity Mates Investing Podcast",
        "Barron's Streetwise",
        "Chat With Traders",
        "CNBC's Fast Money",
        "The Investing for Beginners Podcast",
        "Mad Money w/ Jim Cramer",
        "Investing With IBD",
        "Wall Street Breakfast – Seeking Alpha",
        "The Meb Faber Show",
        "WSJ Your Money Briefing",
        "ETF Prime",
        "Option Alpha Podcast",
        "Animal Spirits",
        "ETF Spotlight - Zacks",
        "Stock Market Today with IBD",
        "The Ideas Exchange",
        "MarketBeat",
        "ETF Spotlight",
        "The Best One Yet",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_news_topics() -> Vec<String> {
    [
        "financial_markets",
        "economy_macro",
        "economy_monetary",
        "technology",
        "earnings",
        "ipo",
        "mergers_and_acquisitions",
        "blockchain",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_episodes_per_show() -> usize {
    14
}
fn default_indexing_news_limit() -> usize {
    50
}
fn default_max_concurrent_sources() -> usize {
    4
}
fn default_max_content_chars() -> usize {
    8100
}
fn default_placeholder() -> String {
    "no transcription".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SymbolsConfig {
    #[serde(default = "default_chart_symbol")]
    pub default_chart_symbol: String,
    #[serde(default = "default_symbols_model")]
    pub model: String,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            default_chart_symbol: default_chart_symbol(),
            model: default_symbols_model(),
        }
    }
}

fn default_chart_symbol() -> String {
    "NASDAQ:AAPL".to_string()
}
fn default_symbols_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
    #[serde(default = "default_live_limit")]
    pub live_limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: default_news_base_url(),
            live_limit: default_live_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_news_base_url() -> String {
    "https://www.alphavantage.co".to_string()
}
fn default_live_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Overrides `AZURE_SPEECH_REGION` when set.
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the regional Azure endpoint (tests, sovereign clouds).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_per_file_secs")]
    pub timeout_per_file_secs: u64,
    #[serde(default = "default_directory_url")]
    pub directory_url: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            region: None,
            endpoint_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            timeout_per_file_secs: default_timeout_per_file_secs(),
            directory_url: default_directory_url(),
        }
    }
}

fn default_locale() -> String {
    "en-US".to_string()
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_timeout_per_file_secs() -> u64 {
    1200
}
fn default_directory_url() -> String {
    "https://itunes.apple.com".to_string()
}

/// Optional re-hosting of episode audio on S3 before transcription.
#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Speed up and recompress with ffmpeg before upload.
    #[serde(default)]
    pub transcode: bool,
    #[serde(default = "default_tempo")]
    pub tempo: f32,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_prefix() -> String {
    "episodes/".to_string()
}
fn default_tempo() -> f32 {
    1.2
}
fn default_bitrate() -> String {
    "48k".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.retrieval.podcast_limit < 1 || config.retrieval.news_limit < 1 {
        anyhow::bail!("retrieval limits must be >= 1");
    }

    if config.indexing.max_concurrent_sources == 0 {
        anyhow::bail!("indexing.max_concurrent_sources must be > 0");
    }
    if config.indexing.max_content_chars == 0 {
        anyhow::bail!("indexing.max_content_chars must be > 0");
    }
    if config.indexing.empty_content_placeholder.trim().is_empty() {
        anyhow::bail!("indexing.empty_content_placeholder must not be empty");
    }

    if config.transcription.poll_interval_secs == 0 {
        anyhow::bail!("transcription.poll_interval_secs must be > 0");
    }
    if config.transcription.timeout_per_file_secs == 0 {
        anyhow::bail!("transcription.timeout_per_file_secs must be > 0");
    }

    if !is_chart_symbol(&config.symbols.default_chart_symbol) {
        anyhow::bail!(
            "symbols.default_chart_symbol must look like EXCHANGE:SYMBOL, got '{}'",
            config.symbols.default_chart_symbol
        );
    }

    if let Some(ref staging) = config.staging {
        if staging.bucket.trim().is_empty() {
            anyhow::bail!("staging.bucket must not be empty");
        }
        if !(0.5..=2.0).contains(&staging.tempo) {
            anyhow::bail!("staging.tempo must be in [0.5, 2.0]");
        }
    }

    Ok(config)
}

fn is_chart_symbol(s: &str) -> bool {
    matches!(s.split_once(':'), Some((ex, sym)) if !ex.is_empty() && !sym.is_empty())
}
