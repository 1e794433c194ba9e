//! Embedding-backed storage and retrieval for both collections.
//!
//! [`Retriever::store`] embeds documents in fixed-size batches; a failed batch
//! is logged and skipped so one bad batch never sinks the rest.
//! [`Retriever::retrieve`] runs a tag-filtered similarity search and removes
//! repeated `source_url`s, best match first.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::models::{ContentDocument, SourceType};
use crate::store::{EmbeddedDocument, SearchFilter, VectorStore};

pub use crate::models::MatchPolicy;

/// Candidates fetched per requested result before deduplication.
const OVERFETCH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub stored_count: usize,
    pub total: usize,
    pub failed_batches: usize,
}

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub limit: usize,
    /// Keep only documents carrying at least one of these. `None` or empty
    /// means no filter.
    pub tags: Option<Vec<String>>,
    pub source_type: SourceType,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    placeholder: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        batch_size: usize,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            batch_size: batch_size.max(1),
            placeholder: placeholder.into(),
        }
    }

    /// Embed and persist `documents` into the `source_type` collection.
    ///
    /// Only a configuration error (missing API key) fails the call; any other
    /// batch failure is counted in the outcome.
    pub async fn store(
        &self,
        documents: Vec<ContentDocument>,
        source_type: SourceType,
    ) -> Result<StoreOutcome> {
        let total = documents.len();
        let mut outcome = StoreOutcome {
            stored_count: 0,
            total,
            failed_batches: 0,
        };

        for (batch_no, batch) in documents.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            let prepared: Vec<ContentDocument> = batch
                .iter()
                .cloned()
                .map(|mut doc| {
                    doc.source_type = source_type;
                    if doc.content.trim().is_empty() {
                        doc.content = self.placeholder.clone();
                    }
                    doc
                })
                .collect();
            let texts: Vec<String> = prepared.iter().map(|d| d.content.clone()).collect();

            let vectors = match self.embedder.embed(&texts).await {
                Ok(v) => v,
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        collection = %source_type,
                        batch = batch_no,
                        size = batch.len(),
                        error = %e,
                        "embedding batch failed, skipping"
                    );
                    outcome.failed_batches += 1;
                    continue;
                }
            };

            if vectors.len() != prepared.len() {
                tracing::warn!(
                    collection = %source_type,
                    batch = batch_no,
                    expected = prepared.len(),
                    got = vectors.len(),
                    "embedding count mismatch, skipping batch"
                );
                outcome.failed_batches += 1;
                continue;
            }

            let embedded: Vec<EmbeddedDocument> = prepared
                .into_iter()
                .zip(vectors)
                .enumerate()
                .map(|(i, (document, embedding))| EmbeddedDocument {
                    document,
                    chunk_index: offset + i,
                    embedding,
                })
                .collect();

            match self
                .store
                .add_documents(source_type, &embedded, self.embedder.model_name())
                .await
            {
                Ok(n) => outcome.stored_count += n,
                Err(e) => {
                    tracing::warn!(
                        collection = %source_type,
                        batch = batch_no,
                        error = %e,
                        "storing batch failed, skipping"
                    );
                    outcome.failed_batches += 1;
                }
            }
        }

        tracing::info!(
            collection = %source_type,
            stored = outcome.stored_count,
            total,
            "documents stored"
        );
        Ok(outcome)
    }

    /// Similarity search with optional tag filter and `source_url` dedup.
    ///
    /// Returns at most `options.limit` documents; fewer means the collection
    /// ran out of matches.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<ContentDocument>> {
        if query.trim().is_empty() || options.limit == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let filter = SearchFilter {
            tags: options.tags.clone(),
        };

        let mut k = options.limit.saturating_mul(OVERFETCH);
        loop {
            let hits = self
                .store
                .similarity_search(options.source_type, &query_vec, k, &filter)
                .await?;
            let exhausted = hits.len() < k;
            let mut docs = dedup_by_source_url(hits.into_iter().map(|h| h.document).collect());

            if docs.len() >= options.limit || exhausted {
                docs.truncate(options.limit);
                return Ok(docs);
            }
            k = k.saturating_mul(2);
        }
    }
}

/// Keep the first document per non-empty `source_url`, preserving order.
pub fn dedup_by_source_url(docs: Vec<ContentDocument>) -> Vec<ContentDocument> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| d.source_url.is_empty() || seen.insert(d.source_url.clone()))
        .collect()
}
