//! The four operations exposed to clients, shared by the CLI and the HTTP
//! server.
//!
//! | Operation | Method |
//! |-----------|--------|
//! | Podcast query | [`QueryService::podcast_query`] |
//! | News query | [`QueryService::news_query`] |
//! | Chart symbols | [`QueryService::chart_symbols`] |
//! | Reindex | [`QueryService::trigger_reindex`] |
//!
//! Every client is constructed once here and injected into the components
//! that use it.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding::{EmbeddingProvider, OpenAIProvider};
use crate::error::{Error, Result};
use crate::ingest::{check_credentials, ContentIngestor, IngestReport, IngestScope, Sources};
use crate::llm::{LlmClient, OpenAiChat};
use crate::models::{ContentDocument, SourceType, TagCategory};
use crate::retrieve::{dedup_by_source_url, RetrieveOptions, Retriever};
use crate::sources::{news_to_document, AlphaVantage, ItunesDirectory, NewsFeed};
use crate::staging::{AudioStager, S3Stager};
use crate::store::{SqliteStore, TagStore, VectorStore};
use crate::summary::Summarizer;
use crate::symbols::{chart_to_sentiment_ticker, SymbolResolver};
use crate::tagging::TagGenerator;
use crate::transcribe::AzureBatchTranscriber;

/// Everything the service talks to.
pub struct Clients {
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub tags: Arc<dyn TagStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub sources: Sources,
}

/// Result of a reindex request.
#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
}

#[derive(Debug, Clone, Copy)]
struct Preflight {
    region_configured: bool,
    staging: bool,
}

pub struct QueryService {
    tagger: Arc<TagGenerator>,
    symbols: SymbolResolver,
    retriever: Arc<Retriever>,
    summarizer: Summarizer,
    news: Arc<dyn NewsFeed>,
    tags: Arc<dyn TagStore>,
    vectors: Arc<dyn VectorStore>,
    ingestor: ContentIngestor,
    retrieval: RetrievalConfig,
    live_news_limit: usize,
    preflight: Option<Preflight>,
}

impl QueryService {
    pub fn new(config: &Config, clients: Clients) -> Self {
        let tagger = Arc::new(TagGenerator::new(clients.llm.clone(), clients.tags.clone()));
        let retriever = Arc::new(Retriever::new(
            clients.embedder.clone(),
            clients.vectors.clone(),
            config.embedding.batch_size,
            config.indexing.empty_content_placeholder.clone(),
        ));
        let news = clients.sources.news.clone();
        let ingestor = ContentIngestor::new(
            clients.sources,
            tagger.clone(),
            clients.tags.clone(),
            clients.vectors.clone(),
            retriever.clone(),
            config.indexing.clone(),
        );

        Self {
            tagger,
            symbols: SymbolResolver::new(clients.llm.clone(), config.symbols.clone()),
            retriever,
            summarizer: Summarizer::new(clients.llm, config.llm.summary_model.clone()),
            news,
            tags: clients.tags,
            vectors: clients.vectors,
            ingestor,
            retrieval: config.retrieval.clone(),
            live_news_limit: config.news.live_limit,
            preflight: None,
        }
    }

    /// Production wiring: OpenAI, Alpha Vantage, iTunes, Azure Speech and
    /// the SQLite store from `config`. Reindex runs check credentials first.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let stager = match &config.staging {
            Some(staging) => {
                let stager: Arc<dyn AudioStager> =
                    Arc::new(S3Stager::new(staging.clone(), config.llm.max_retries)?);
                Some(stager)
            }
            None => None,
        };
        let sources = Sources {
            directory: Arc::new(ItunesDirectory::new(
                &config.transcription.directory_url,
                config.news.timeout_secs,
                config.llm.max_retries,
            )?),
            news: Arc::new(AlphaVantage::new(&config.news, config.llm.max_retries)?),
            transcriber: Arc::new(AzureBatchTranscriber::new(
                &config.transcription,
                config.llm.max_retries,
            )?),
            stager,
        };

        let clients = Clients {
            llm: Arc::new(OpenAiChat::new(&config.llm)?),
            embedder: Arc::new(OpenAIProvider::new(&config.embedding)?),
            tags: store.clone(),
            vectors: store,
            sources,
        };

        let mut service = Self::new(config, clients);
        service.preflight = Some(Preflight {
            region_configured: config.transcription.region.is_some()
                || config.transcription.endpoint_url.is_some(),
            staging: config.staging.is_some(),
        });
        Ok(service)
    }

    /// Podcast episodes relevant to `query`, each with a short relevance
    /// summary.
    pub async fn podcast_query(&self, query: &str) -> Result<Vec<ContentDocument>> {
        let tags = self
            .tagger
            .resolve(query, TagCategory::Audio, self.retrieval.podcast_policy)
            .await?;
        tracing::debug!(query, ?tags, "podcast query tags");

        let docs = self
            .retriever
            .retrieve(
                query,
                &RetrieveOptions {
                    limit: self.retrieval.podcast_limit,
                    tags: Some(tags),
                    source_type: SourceType::Podcast,
                },
            )
            .await?;

        let summaries = futures::future::join_all(
            docs.iter().map(|d| self.summarizer.summarize(d, query)),
        )
        .await;

        Ok(docs
            .into_iter()
            .zip(summaries)
            .map(|(mut doc, summary)| {
                doc.ai_summary = summary;
                doc
            })
            .collect())
    }

    /// Latest sentiment-scored articles for the query's tickers, merged with
    /// indexed news.
    ///
    /// `chart_symbols` are `EXCHANGE:SYMBOL` groups from a previous
    /// [`chart_symbols`](Self::chart_symbols) call; when none convert to a
    /// sentiment ticker the query itself is resolved. No tickers at all is
    /// [`Error::NoTickers`].
    pub async fn news_query(
        &self,
        query: &str,
        chart_symbols: Option<Vec<Vec<String>>>,
    ) -> Result<Vec<ContentDocument>> {
        let mut tickers = chart_symbols
            .map(|groups| tickers_from_chart_symbols(&groups))
            .unwrap_or_default();
        if tickers.is_empty() {
            tickers = self.symbols.resolve_sentiment_tickers(query).await?;
        }
        if tickers.is_empty() {
            return Err(Error::NoTickers);
        }
        tracing::debug!(query, %tickers, "news query tickers");

        let live = match self.news.by_tickers(&tickers, self.live_news_limit).await {
            Ok(items) => items.iter().map(news_to_document).collect(),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                tracing::warn!(%tickers, error = %e, "live news fetch failed");
                Vec::new()
            }
        };

        let tags = self
            .tagger
            .resolve(query, TagCategory::News, self.retrieval.news_policy)
            .await?;
        let indexed = self
            .retriever
            .retrieve(
                query,
                &RetrieveOptions {
                    limit: self.retrieval.news_limit,
                    tags: Some(tags),
                    source_type: SourceType::News,
                },
            )
            .await?;

        let mut merged: Vec<ContentDocument> = live;
        merged.extend(indexed);
        let mut merged = dedup_by_source_url(merged);
        merged.truncate(self.retrieval.news_limit);
        Ok(merged)
    }

    pub async fn chart_symbols(&self, query: &str) -> Result<Vec<Vec<String>>> {
        self.symbols.resolve_chart_symbols(query).await
    }

    /// Run an indexing pass. Per-source failures are reported, not raised.
    pub async fn trigger_reindex(&self, scope: IngestScope) -> ReindexResponse {
        if let Some(p) = self.preflight {
            if let Err(e) = check_credentials(scope, p.region_configured, p.staging) {
                tracing::error!(%scope, error = %e, "reindex refused");
                return ReindexResponse {
                    success: false,
                    message: "Indexing failed".to_string(),
                    error: Some(e.to_string()),
                    report: None,
                };
            }
        }

        let report = self.ingestor.run(scope).await;
        let failed = report.failures().count();
        ReindexResponse {
            success: true,
            message: format!(
                "Indexing completed: {} documents stored from {} sources ({} failed)",
                report.stored(),
                report.sources.len(),
                failed
            ),
            error: None,
            report: Some(report),
        }
    }

    pub async fn vocabulary(&self, category: TagCategory) -> Result<Vec<String>> {
        self.tags.get(category).await
    }

    pub async fn document_count(&self, source_type: SourceType) -> Result<usize> {
        self.vectors.count(source_type).await
    }
}

/// Comma-joined sentiment tickers for chart symbols, skipping markets the
/// news feed does not cover.
pub fn tickers_from_chart_symbols(groups: &[Vec<String>]) -> String {
    let mut seen = HashSet::new();
    groups
        .iter()
        .flatten()
        .filter_map(|s| chart_to_sentiment_ticker(s))
        .filter(|t| seen.insert(t.clone()))
        .collect::<Vec<_>>()
        .join(",")
}
