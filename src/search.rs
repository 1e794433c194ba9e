//! Command-line front ends for the query operations.
//!
//! Each `run_*` function builds a [`QueryService`] from config, runs one
//! operation and prints a human-readable result to stdout. Logs go to
//! stderr, so stdout stays clean for piping.

use anyhow::Result;

use crate::config::Config;
use crate::error::Error;
use crate::ingest::{IngestReport, IngestScope};
use crate::models::{ContentDocument, SourceType, TagCategory};
use crate::service::QueryService;

/// `fins search <podcasts|news> <query> [--tickers ...]`
pub async fn run_search(
    config: &Config,
    source_type: SourceType,
    query: &str,
    tickers: Vec<String>,
) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }
    let service = QueryService::from_config(config).await?;

    let docs = match source_type {
        SourceType::Podcast => service.podcast_query(query).await?,
        SourceType::News => {
            let chart_symbols = if tickers.is_empty() {
                None
            } else {
                Some(vec![tickers])
            };
            match service.news_query(query, chart_symbols).await {
                Ok(docs) => docs,
                Err(Error::NoTickers) => {
                    println!("No tickers could be resolved for this query.");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    print_documents(&docs);
    Ok(())
}

fn print_documents(docs: &[ContentDocument]) {
    if docs.is_empty() {
        println!("No results.");
        return;
    }

    for (i, doc) in docs.iter().enumerate() {
        let title = if doc.title.is_empty() {
            "(untitled)"
        } else {
            doc.title.as_str()
        };
        let date = doc
            .upload_time
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!("{}. {} / {}", i + 1, doc.source_type, title);
        if !date.is_empty() {
            println!("    published: {}", date);
        }
        if !doc.author.is_empty() {
            println!("    author: {}", doc.author);
        }
        if !doc.source_url.is_empty() {
            println!("    url: {}", doc.source_url);
        }
        if let Some(sentiment) = &doc.sentiment {
            println!("    sentiment: {} ({:.3})", sentiment.label, sentiment.score);
        }
        if !doc.tags.is_empty() {
            println!("    tags: {}", doc.tags.join(", "));
        }
        if let Some(summary) = &doc.ai_summary {
            println!("    summary: \"{}\"", summary);
        }
        println!();
    }
}

/// `fins symbols <query>`
pub async fn run_symbols(config: &Config, query: &str) -> Result<()> {
    let service = QueryService::from_config(config).await?;
    let groups = service.chart_symbols(query).await?;

    if groups.is_empty() {
        println!("No chart.");
        return Ok(());
    }
    for group in &groups {
        println!("{}", group.join(" "));
    }
    Ok(())
}

/// `fins tags <audio|news>`
pub async fn run_tags(config: &Config, category: TagCategory) -> Result<()> {
    let service = QueryService::from_config(config).await?;
    let tags = service.vocabulary(category).await?;

    println!("{} tags: {}", category, tags.len());
    for tag in &tags {
        println!("  {}", tag);
    }
    Ok(())
}

/// `fins index <podcasts|news|all>`
pub async fn run_index(config: &Config, scope: IngestScope) -> Result<()> {
    let service = QueryService::from_config(config).await?;
    let response = service.trigger_reindex(scope).await;

    if let Some(report) = &response.report {
        print_report(scope, report);
    }
    if !response.success {
        anyhow::bail!(response.error.unwrap_or(response.message));
    }
    println!("ok");
    Ok(())
}

fn print_report(scope: IngestScope, report: &IngestReport) {
    println!("index {}", scope);
    println!(
        "  {:<40} {:<8} {:>7} {:>7} {:>6}   {}",
        "SOURCE", "TYPE", "FETCHED", "SKIPPED", "STORED", "STATUS"
    );
    for s in &report.sources {
        let status = match &s.error {
            Some(e) => format!("failed at {}: {}", s.stage, e),
            None => "done".to_string(),
        };
        println!(
            "  {:<40} {:<8} {:>7} {:>7} {:>6}   {}",
            truncate(&s.name, 40),
            s.source_type,
            s.fetched,
            s.skipped,
            s.stored,
            status
        );
    }
    println!("  stored: {} documents", report.stored());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
