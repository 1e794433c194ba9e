//! Database statistics and health overview.
//!
//! A quick summary of what's indexed: documents per collection, when each
//! collection last grew, and the size of each tag vocabulary. Used by
//! `fins stats` to confirm that indexing runs are landing.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{SourceType, TagCategory};
use crate::store::sqlite::collection_table;
use crate::store::{SqliteStore, TagStore};

struct CollectionStats {
    source_type: SourceType,
    doc_count: i64,
    embedding_models: Vec<String>,
    last_indexed_ts: Option<i64>,
}

/// Query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let mut collections = Vec::new();
    for source_type in [SourceType::Podcast, SourceType::News] {
        collections.push(collection_stats(&pool, source_type).await?);
    }

    let vocabularies = vocabulary_sizes(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("finsight database stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!(
        "  {:<12} {:>8}   {:<24} {}",
        "COLLECTION", "DOCS", "MODEL", "LAST INDEXED"
    );
    println!("  {}", "-".repeat(68));
    for c in &collections {
        let last = match c.last_indexed_ts {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        };
        let models = if c.embedding_models.is_empty() {
            "-".to_string()
        } else {
            c.embedding_models.join(",")
        };
        println!(
            "  {:<12} {:>8}   {:<24} {}",
            c.source_type.as_str(),
            c.doc_count,
            models,
            last
        );
    }

    println!();
    println!("  Tag vocabularies:");
    for (category, count) in &vocabularies {
        println!("    {:<8} {} tags", category.as_str(), count);
    }
    println!();

    pool.close().await;
    Ok(())
}

async fn vocabulary_sizes(pool: &SqlitePool) -> Result<Vec<(TagCategory, usize)>> {
    let store = SqliteStore::new(pool.clone());
    let mut sizes = Vec::new();
    for category in [TagCategory::Audio, TagCategory::News] {
        sizes.push((category, store.get(category).await?.len()));
    }
    Ok(sizes)
}

async fn collection_stats(pool: &SqlitePool, source_type: SourceType) -> Result<CollectionStats> {
    let table = collection_table(source_type);
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) AS doc_count, MAX(created_at) AS last_ts FROM {table}"
    ))
    .fetch_one(pool)
    .await?;

    // Mixed models in one collection make similarity scores meaningless.
    let embedding_models: Vec<String> =
        sqlx::query_scalar(&format!("SELECT DISTINCT model FROM {table} ORDER BY model"))
            .fetch_all(pool)
            .await?;

    Ok(CollectionStats {
        source_type,
        doc_count: row.get("doc_count"),
        embedding_models,
        last_indexed_ts: row.get("last_ts"),
    })
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now ("3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vocabulary_sizes_come_from_the_tag_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.db.path = tmp.path().join("stats.sqlite");
        let pool = db::connect(&config).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();

        let store = SqliteStore::new(pool.clone());
        store
            .merge(TagCategory::Audio, &["Apple".into(), "Bonds".into(), "Apple".into()])
            .await
            .unwrap();

        let sizes = vocabulary_sizes(&pool).await.unwrap();
        assert_eq!(sizes, vec![(TagCategory::Audio, 2), (TagCategory::News, 0)]);
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn recent_timestamps_are_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
