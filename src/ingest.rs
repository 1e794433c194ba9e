//! Indexing pipeline orchestration.
//!
//! One *source* is a configured podcast show or a news topic string. Each
//! source runs through a fixed sequence of stages:
//!
//! ```text
//! Pending → Fetching → Transcribing (podcasts) → Normalizing → Tagging → Embedding → Done
//! ```
//!
//! Sources run concurrently, bounded by `indexing.max_concurrent_sources`.
//! A failure at any stage stops that source only: it is logged with the
//! source name and stage, and the source is reported as failed with zero
//! stored documents. [`ContentIngestor::run`] itself never fails because of
//! a single source.
//!
//! Items already present in the target collection (same title or same
//! source URL) are skipped before any transcription or tagging work.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::IndexingConfig;
use crate::error::{credential, Result};
use crate::models::{ContentDocument, SourceType};
use crate::retrieve::Retriever;
use crate::sources::{episode_to_document, news_to_document, NewsFeed, PodcastDirectory};
use crate::staging::{AudioStager, S3Stager};
use crate::store::{IndexedKeys, TagStore, VectorStore};
use crate::tagging::TagGenerator;
use crate::transcribe::Transcriber;

/// Which collections an indexing run refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestScope {
    Podcasts,
    News,
    All,
}

impl IngestScope {
    pub fn includes(&self, source_type: SourceType) -> bool {
        matches!(
            (self, source_type),
            (IngestScope::All, _)
                | (IngestScope::Podcasts, SourceType::Podcast)
                | (IngestScope::News, SourceType::News)
        )
    }
}

impl FromStr for IngestScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "podcasts" | "podcast" => Ok(IngestScope::Podcasts),
            "news" => Ok(IngestScope::News),
            "all" => Ok(IngestScope::All),
            other => Err(format!(
                "unknown scope '{}': expected podcasts, news or all",
                other
            )),
        }
    }
}

impl fmt::Display for IngestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestScope::Podcasts => "podcasts",
            IngestScope::News => "news",
            IngestScope::All => "all",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pending,
    Fetching,
    Transcribing,
    Normalizing,
    Tagging,
    Embedding,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Pending => "pending",
            Stage::Fetching => "fetching",
            Stage::Transcribing => "transcribing",
            Stage::Normalizing => "normalizing",
            Stage::Tagging => "tagging",
            Stage::Embedding => "embedding",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Outcome for one source. When `error` is set, `stage` is where it failed.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub source_type: SourceType,
    pub stage: Stage,
    pub fetched: usize,
    pub skipped: usize,
    pub stored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn new(name: &str, source_type: SourceType) -> Self {
        Self {
            name: name.to_string(),
            source_type,
            stage: Stage::Pending,
            fetched: 0,
            skipped: 0,
            stored: 0,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
}

impl IngestReport {
    pub fn stored(&self) -> usize {
        self.sources.iter().map(|s| s.stored).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.failed())
    }
}

/// Environment credentials an indexing run of `scope` will need.
pub fn required_credentials(scope: IngestScope, region_configured: bool) -> Vec<&'static str> {
    let mut names = vec!["OPENAI_API_KEY"];
    if scope.includes(SourceType::News) {
        names.push("ALPHA_VANTAGE_API_KEY");
    }
    if scope.includes(SourceType::Podcast) {
        names.push("AZURE_SPEECH_API_KEY");
        if !region_configured {
            names.push("AZURE_SPEECH_REGION");
        }
    }
    names
}

/// Fail before any work starts if a needed credential is missing.
pub fn check_credentials(scope: IngestScope, region_configured: bool, staging: bool) -> Result<()> {
    for name in required_credentials(scope, region_configured) {
        credential(name)?;
    }
    if staging && scope.includes(SourceType::Podcast) {
        S3Stager::check_credentials()?;
    }
    Ok(())
}

/// Upstream clients an ingestor pulls from.
pub struct Sources {
    pub directory: Arc<dyn PodcastDirectory>,
    pub news: Arc<dyn NewsFeed>,
    pub transcriber: Arc<dyn Transcriber>,
    pub stager: Option<Arc<dyn AudioStager>>,
}

enum SourceJob {
    Podcast(String),
    News(String),
}

pub struct ContentIngestor {
    sources: Sources,
    tagger: Arc<TagGenerator>,
    tags: Arc<dyn TagStore>,
    vectors: Arc<dyn VectorStore>,
    retriever: Arc<Retriever>,
    config: IndexingConfig,
}

impl ContentIngestor {
    pub fn new(
        sources: Sources,
        tagger: Arc<TagGenerator>,
        tags: Arc<dyn TagStore>,
        vectors: Arc<dyn VectorStore>,
        retriever: Arc<Retriever>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            sources,
            tagger,
            tags,
            vectors,
            retriever,
            config,
        }
    }

    /// Index every configured source in `scope`.
    pub async fn run(&self, scope: IngestScope) -> IngestReport {
        let mut jobs = Vec::new();
        if scope.includes(SourceType::Podcast) {
            let mut seen = HashSet::new();
            for show in &self.config.podcasts {
                let show = show.trim();
                if !show.is_empty() && seen.insert(show.to_lowercase()) {
                    jobs.push(SourceJob::Podcast(show.to_string()));
                }
            }
        }
        if scope.includes(SourceType::News) {
            for topic in &self.config.news_topics {
                if !topic.trim().is_empty() {
                    jobs.push(SourceJob::News(topic.trim().to_string()));
                }
            }
        }

        tracing::info!(%scope, sources = jobs.len(), "indexing run started");

        let mut reports: Vec<(usize, SourceReport)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(i, job)| async move { (i, self.run_source(job).await) })
            .buffer_unordered(self.config.max_concurrent_sources.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(i, _)| *i);

        let report = IngestReport {
            sources: reports.into_iter().map(|(_, r)| r).collect(),
        };
        tracing::info!(
            %scope,
            stored = report.stored(),
            failed = report.failures().count(),
            "indexing run finished"
        );
        report
    }

    async fn run_source(&self, job: SourceJob) -> SourceReport {
        let (mut report, result) = match job {
            SourceJob::Podcast(show) => {
                let mut report = SourceReport::new(&show, SourceType::Podcast);
                let result = self.index_show(&show, &mut report).await;
                (report, result)
            }
            SourceJob::News(topic) => {
                let mut report = SourceReport::new(&topic, SourceType::News);
                let result = self.index_topic(&topic, &mut report).await;
                (report, result)
            }
        };

        match result {
            Ok(()) => {
                report.stage = Stage::Done;
                tracing::info!(
                    source = %report.name,
                    source_type = %report.source_type,
                    fetched = report.fetched,
                    skipped = report.skipped,
                    stored = report.stored,
                    "source indexed"
                );
            }
            Err(e) => {
                tracing::error!(
                    source = %report.name,
                    source_type = %report.source_type,
                    stage = %report.stage,
                    error = %e,
                    "source failed"
                );
                report.stored = 0;
                report.error = Some(e.to_string());
            }
        }
        report
    }

    async fn index_show(&self, show: &str, report: &mut SourceReport) -> Result<()> {
        report.stage = Stage::Fetching;
        let feed_url = match self.sources.directory.find_feed(show).await? {
            Some(url) => url,
            None => {
                tracing::warn!(source = show, "show not found in directory");
                return Ok(());
            }
        };
        let episodes = self
            .sources
            .directory
            .episodes(&feed_url, self.config.episodes_per_show)
            .await?;
        report.fetched = episodes.len();

        let known = self.vectors.indexed_keys(SourceType::Podcast).await?;
        let episodes: Vec<_> = fresh_items(episodes, &known, |e| (&e.title, &e.audio_url))
            .into_iter()
            .filter(|e| !e.audio_url.is_empty())
            .collect();
        report.skipped = report.fetched - episodes.len();
        if episodes.is_empty() {
            return Ok(());
        }

        report.stage = Stage::Transcribing;
        let urls: Vec<String> = episodes.iter().map(|e| e.audio_url.clone()).collect();
        let transcripts = self.transcribe(&urls).await?;

        report.stage = Stage::Normalizing;
        let docs: Vec<ContentDocument> = episodes
            .iter()
            .map(|e| {
                episode_to_document(
                    e,
                    transcripts.get(&e.audio_url).map(String::as_str),
                    self.config.max_content_chars,
                    &self.config.empty_content_placeholder,
                )
            })
            .collect();

        self.tag_and_store(docs, SourceType::Podcast, report).await
    }

    async fn index_topic(&self, topic: &str, report: &mut SourceReport) -> Result<()> {
        report.stage = Stage::Fetching;
        let items = self
            .sources
            .news
            .by_topics(topic, self.config.news_limit)
            .await?;
        report.fetched = items.len();

        let known = self.vectors.indexed_keys(SourceType::News).await?;
        let items = fresh_items(items, &known, |i| (&i.title, &i.url));
        report.skipped = report.fetched - items.len();
        if items.is_empty() {
            return Ok(());
        }

        report.stage = Stage::Normalizing;
        let docs = items.iter().map(news_to_document).collect();

        self.tag_and_store(docs, SourceType::News, report).await
    }

    /// Submit one batch job, staging audio first when configured. Results
    /// are keyed by the original episode URL.
    async fn transcribe(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        let stager = match &self.sources.stager {
            Some(s) => s,
            None => return self.sources.transcriber.transcribe(urls).await,
        };

        let mut submitted = Vec::with_capacity(urls.len());
        let mut original_of = HashMap::new();
        for url in urls {
            let staged = match stager.stage(url).await {
                Ok(staged) => staged,
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "staging failed, submitting original URL");
                    url.clone()
                }
            };
            original_of.insert(staged.clone(), url.clone());
            submitted.push(staged);
        }

        let transcripts = self.sources.transcriber.transcribe(&submitted).await?;
        Ok(transcripts
            .into_iter()
            .filter_map(|(url, text)| original_of.get(&url).map(|o| (o.clone(), text)))
            .collect())
    }

    async fn tag_and_store(
        &self,
        mut docs: Vec<ContentDocument>,
        source_type: SourceType,
        report: &mut SourceReport,
    ) -> Result<()> {
        report.stage = Stage::Tagging;
        let category = source_type.tag_category();
        let mut union = Vec::new();
        for doc in &mut docs {
            let text = if doc.content == self.config.empty_content_placeholder {
                ""
            } else {
                doc.content.as_str()
            };
            doc.tags = self.tagger.extract_tags(text, category).await?;
            union.extend(doc.tags.iter().cloned());
        }
        self.tags.merge(category, &union).await?;

        report.stage = Stage::Embedding;
        let outcome = self.retriever.store(docs, source_type).await?;
        report.stored = outcome.stored_count;
        Ok(())
    }
}

/// Drop items already indexed (by title or URL) and repeats of a URL
/// within the same feed.
fn fresh_items<T, F>(items: Vec<T>, known: &IndexedKeys, key: F) -> Vec<T>
where
    F: Fn(&T) -> (&String, &String),
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let (title, url) = key(item);
            !known.contains(title, url) && (url.is_empty() || seen.insert(url.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Episode;

    fn ep(title: &str, url: &str) -> Episode {
        Episode {
            title: title.to_string(),
            audio_url: url.to_string(),
            ..Episode::default()
        }
    }

    #[test]
    fn scope_parsing() {
        assert_eq!("Podcasts".parse::<IngestScope>().unwrap(), IngestScope::Podcasts);
        assert_eq!("all".parse::<IngestScope>().unwrap(), IngestScope::All);
        assert!("videos".parse::<IngestScope>().is_err());
        assert!(IngestScope::All.includes(SourceType::News));
        assert!(!IngestScope::News.includes(SourceType::Podcast));
    }

    #[test]
    fn fresh_items_skips_known_and_repeats() {
        let mut known = IndexedKeys::default();
        known.titles.insert("Old episode".to_string());
        known.urls.insert("https://cdn/old.mp3".to_string());

        let items = vec![
            ep("Old episode", "https://cdn/moved.mp3"),
            ep("Renamed", "https://cdn/old.mp3"),
            ep("New", "https://cdn/new.mp3"),
            ep("New (repost)", "https://cdn/new.mp3"),
            ep("Other", "https://cdn/other.mp3"),
        ];
        let titles: Vec<_> = fresh_items(items, &known, |e| (&e.title, &e.audio_url))
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["New", "Other"]);
    }

    #[test]
    fn credentials_follow_scope() {
        let news = required_credentials(IngestScope::News, false);
        assert_eq!(news, vec!["OPENAI_API_KEY", "ALPHA_VANTAGE_API_KEY"]);

        let pods = required_credentials(IngestScope::Podcasts, true);
        assert_eq!(pods, vec!["OPENAI_API_KEY", "AZURE_SPEECH_API_KEY"]);

        let all = required_credentials(IngestScope::All, false);
        assert!(all.contains(&"AZURE_SPEECH_REGION"));
    }
}
