//! SQLite-backed [`TagStore`] and [`VectorStore`].
//!
//! Documents live in one table per source type with the vector stored as a
//! little-endian BLOB; similarity is brute-force cosine over the collection.
//! Tag vocabularies live in `tag_collections`, one JSON array per category.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::Result;
use crate::models::{ContentDocument, SourceType, TagCategory};

use super::{
    merge_tags, rank, EmbeddedDocument, IndexedKeys, ScoredDocument, SearchFilter, TagStore,
    VectorStore,
};

/// Table holding the collection for `source_type`.
pub fn collection_table(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::Podcast => "podcast_documents",
        SourceType::News => "news_documents",
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Everything except `content` and the post-retrieval summary goes into
/// `metadata_json`, plus the submission position.
fn document_metadata(doc: &EmbeddedDocument) -> Result<String> {
    let mut value = serde_json::to_value(&doc.document)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("content");
        map.remove("aiSummary");
        map.insert("chunk_index".to_string(), doc.chunk_index.into());
    }
    Ok(serde_json::to_string(&value)?)
}

fn row_to_document(content: String, metadata_json: &str) -> Result<ContentDocument> {
    let mut value: serde_json::Value = serde_json::from_str(metadata_json)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("content".to_string(), content.into());
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl TagStore for SqliteStore {
    async fn get(&self, category: TagCategory) -> Result<Vec<String>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT tags_json FROM tag_collections WHERE category = ?")
                .bind(category.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn merge(&self, category: TagCategory, new_tags: &[String]) -> Result<Vec<String>> {
        if new_tags.iter().all(|t| t.trim().is_empty()) {
            return self.get(category).await;
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before the read, so
        // concurrent merges queue up behind each other instead of racing.
        sqlx::query(
            r#"
            INSERT INTO tag_collections (category, tags_json, updated_at)
            VALUES (?, '[]', ?)
            ON CONFLICT(category) DO NOTHING
            "#,
        )
        .bind(category.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let existing_json: String =
            sqlx::query_scalar("SELECT tags_json FROM tag_collections WHERE category = ?")
                .bind(category.as_str())
                .fetch_one(&mut *tx)
                .await?;
        let existing: Vec<String> = serde_json::from_str(&existing_json)?;

        let merged = merge_tags(existing, new_tags.iter().cloned());

        sqlx::query("UPDATE tag_collections SET tags_json = ?, updated_at = ? WHERE category = ?")
            .bind(serde_json::to_string(&merged)?)
            .bind(now)
            .bind(category.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(category = %category, size = merged.len(), "tag vocabulary merged");
        Ok(merged)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add_documents(
        &self,
        source_type: SourceType,
        documents: &[EmbeddedDocument],
        model: &str,
    ) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let table = collection_table(source_type);
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for doc in documents {
            let metadata = document_metadata(doc)?;
            sqlx::query(&format!(
                r#"
                INSERT INTO {table}
                    (id, content, title, source_url, metadata_json, embedding, dims, model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#
            ))
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&doc.document.content)
            .bind(&doc.document.title)
            .bind(&doc.document.source_url)
            .bind(metadata)
            .bind(vec_to_blob(&doc.embedding))
            .bind(doc.embedding.len() as i64)
            .bind(model)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(documents.len())
    }

    async fn similarity_search(
        &self,
        source_type: SourceType,
        query_vec: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredDocument>> {
        let table = collection_table(source_type);
        let rows = sqlx::query(&format!(
            "SELECT content, metadata_json, embedding FROM {table}"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        for row in &rows {
            let document = row_to_document(row.get("content"), row.get("metadata_json"))?;
            if !filter.matches(&document) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query_vec, &blob_to_vec(&blob));
            hits.push(ScoredDocument { document, score });
        }

        Ok(rank(hits, k))
    }

    async fn indexed_keys(&self, source_type: SourceType) -> Result<IndexedKeys> {
        let table = collection_table(source_type);
        let rows = sqlx::query(&format!("SELECT title, source_url FROM {table}"))
            .fetch_all(&self.pool)
            .await?;

        let mut keys = IndexedKeys::default();
        for row in &rows {
            let title: String = row.get("title");
            let url: String = row.get("source_url");
            if !title.is_empty() {
                keys.titles.insert(title);
            }
            if !url.is_empty() {
                keys.urls.insert(url);
            }
        }
        Ok(keys)
    }

    async fn count(&self, source_type: SourceType) -> Result<usize> {
        let table = collection_table(source_type);
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
