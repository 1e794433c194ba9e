//! In-memory [`TagStore`] and [`VectorStore`] for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over all stored vectors.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{ContentDocument, SourceType, TagCategory};

use super::{
    rank, EmbeddedDocument, IndexedKeys, ScoredDocument, SearchFilter, TagStore, VectorStore,
};

struct StoredVector {
    document: ContentDocument,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tags: RwLock<HashMap<TagCategory, BTreeSet<String>>>,
    vectors: RwLock<HashMap<SourceType, Vec<StoredVector>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// A panic while holding a lock leaves plain data behind; keep serving it.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl TagStore for InMemoryStore {
    async fn get(&self, category: TagCategory) -> Result<Vec<String>> {
        Ok(read(&self.tags)
            .get(&category)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn merge(&self, category: TagCategory, new_tags: &[String]) -> Result<Vec<String>> {
        let incoming: Vec<&String> = new_tags.iter().filter(|t| !t.trim().is_empty()).collect();
        if incoming.is_empty() {
            return self.get(category).await;
        }

        let mut guard = write(&self.tags);
        let set = guard.entry(category).or_default();
        set.extend(incoming.into_iter().cloned());
        Ok(set.iter().cloned().collect())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add_documents(
        &self,
        source_type: SourceType,
        documents: &[EmbeddedDocument],
        _model: &str,
    ) -> Result<usize> {
        let mut guard = write(&self.vectors);
        let collection = guard.entry(source_type).or_default();
        for doc in documents {
            collection.push(StoredVector {
                document: doc.document.clone(),
                vector: doc.embedding.clone(),
            });
        }
        Ok(documents.len())
    }

    async fn similarity_search(
        &self,
        source_type: SourceType,
        query_vec: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredDocument>> {
        let guard = read(&self.vectors);
        let hits = guard
            .get(&source_type)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|sv| filter.matches(&sv.document))
                    .map(|sv| ScoredDocument {
                        document: sv.document.clone(),
                        score: cosine_similarity(query_vec, &sv.vector),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rank(hits, k))
    }

    async fn indexed_keys(&self, source_type: SourceType) -> Result<IndexedKeys> {
        let guard = read(&self.vectors);
        let mut keys = IndexedKeys::default();
        for sv in guard.get(&source_type).into_iter().flatten() {
            if !sv.document.title.is_empty() {
                keys.titles.insert(sv.document.title.clone());
            }
            if !sv.document.source_url.is_empty() {
                keys.urls.insert(sv.document.source_url.clone());
            }
        }
        Ok(keys)
    }

    async fn count(&self, source_type: SourceType) -> Result<usize> {
        Ok(read(&self.vectors)
            .get(&source_type)
            .map(|c| c.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merge_then_get() {
        let store = InMemoryStore::new();
        let tags = vec!["Tesla".to_string(), "Apple".to_string(), "Apple".to_string()];
        let merged = store.merge(TagCategory::Audio, &tags).await.unwrap();
        assert_eq!(merged, vec!["Apple".to_string(), "Tesla".to_string()]);
        assert!(store.get(TagCategory::News).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collections_are_separate() {
        let store = InMemoryStore::new();
        let doc = EmbeddedDocument {
            document: ContentDocument::new("x", SourceType::News),
            chunk_index: 0,
            embedding: vec![1.0],
        };
        store
            .add_documents(SourceType::News, &[doc], "m")
            .await
            .unwrap();
        assert_eq!(store.count(SourceType::News).await.unwrap(), 1);
        assert_eq!(store.count(SourceType::Podcast).await.unwrap(), 0);
    }
}
