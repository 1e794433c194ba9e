//! Storage abstraction for tag vocabularies and document vectors.
//!
//! [`TagStore`] holds one unique, sorted vocabulary per [`TagCategory`].
//! [`VectorStore`] holds embedded documents, one collection per
//! [`SourceType`], and answers filtered similarity queries.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | SQLite | [`sqlite`] | CLI and server |
//! | In-memory | [`memory`] | tests |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};

use crate::error::Result;
use crate::models::{ContentDocument, SourceType, TagCategory};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Restricts a similarity search to documents sharing at least one tag.
///
/// `None` or an empty list means unfiltered.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub tags: Option<Vec<String>>,
}

impl SearchFilter {
    pub fn tags(tags: Vec<String>) -> Self {
        Self { tags: Some(tags) }
    }

    pub fn matches(&self, doc: &ContentDocument) -> bool {
        match &self.tags {
            Some(tags) if !tags.is_empty() => doc.has_any_tag(tags),
            _ => true,
        }
    }
}

/// A document ready to be written, with its vector.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub document: ContentDocument,
    /// Position in the list originally submitted for storage.
    pub chunk_index: usize,
    pub embedding: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: ContentDocument,
    pub score: f32,
}

/// Titles and source URLs already present in a collection.
#[derive(Debug, Clone, Default)]
pub struct IndexedKeys {
    pub titles: HashSet<String>,
    pub urls: HashSet<String>,
}

impl IndexedKeys {
    /// True if an item with this title or URL was ingested before.
    pub fn contains(&self, title: &str, url: &str) -> bool {
        (!title.is_empty() && self.titles.contains(title))
            || (!url.is_empty() && self.urls.contains(url))
    }
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// Current vocabulary for `category`. A category never written is empty.
    async fn get(&self, category: TagCategory) -> Result<Vec<String>>;

    /// Union `new_tags` into the vocabulary and return the resulting sorted
    /// set. Empty input returns the current vocabulary without writing.
    async fn merge(&self, category: TagCategory, new_tags: &[String]) -> Result<Vec<String>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a batch of documents into the collection for `source_type`.
    /// Returns the number of rows written.
    async fn add_documents(
        &self,
        source_type: SourceType,
        documents: &[EmbeddedDocument],
        model: &str,
    ) -> Result<usize>;

    /// Top `k` documents by cosine similarity that pass `filter`, best first.
    async fn similarity_search(
        &self,
        source_type: SourceType,
        query_vec: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredDocument>>;

    async fn indexed_keys(&self, source_type: SourceType) -> Result<IndexedKeys>;

    async fn count(&self, source_type: SourceType) -> Result<usize>;
}

/// Sorted union of two tag lists with blanks dropped.
pub fn merge_tags<I, J>(existing: I, new_tags: J) -> Vec<String>
where
    I: IntoIterator<Item = String>,
    J: IntoIterator<Item = String>,
{
    existing
        .into_iter()
        .chain(new_tags)
        .filter(|t| !t.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sort hits best first and keep the top `k`.
pub(crate) fn rank(mut hits: Vec<ScoredDocument>, k: usize) -> Vec<ScoredDocument> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(k);
    hits
}
