//! # finsight CLI (`fins`)
//!
//! The `fins` binary indexes financial podcasts and news and answers
//! queries against the index, from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! fins --config ./config/fins.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fins init` | Create the SQLite database and run schema migrations |
//! | `fins index <podcasts\|news\|all>` | Fetch, transcribe, tag and embed new content |
//! | `fins search <podcasts\|news> "<query>"` | Query one collection |
//! | `fins symbols "<query>"` | Resolve chart symbols for a query |
//! | `fins tags <audio\|news>` | Print a tag vocabulary |
//! | `fins stats` | Document and vocabulary counts |
//! | `fins serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! fins init
//! fins index news
//! fins search podcasts "what are people saying about rate cuts"
//! fins search news "semiconductors" --tickers NASDAQ:NVDA,NASDAQ:AMD
//! fins serve
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`) and written to
//! stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use finsight::ingest::IngestScope;
use finsight::models::{SourceType, TagCategory};
use finsight::{config, migrate, search, server, stats};

/// finsight: tag-driven retrieval over financial podcasts and news.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Credentials are read from the environment by the commands that
/// need them.
#[derive(Parser)]
#[command(
    name = "fins",
    about = "finsight: tag-driven retrieval over financial podcasts and news",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/fins.toml`. Every section is optional.
    #[arg(long, global = true, default_value = "./config/fins.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, both document collections and the
    /// tag vocabulary table. Safe to run repeatedly.
    Init,

    /// Index configured podcast shows and/or news topics.
    ///
    /// Already-indexed items are skipped. A failing source is reported and
    /// does not stop the others.
    Index {
        /// `podcasts`, `news`, or `all`.
        #[arg(default_value = "all")]
        scope: IngestScope,
    },

    /// Query the podcast or news collection.
    Search {
        /// `podcasts` or `news`.
        source: SourceType,

        /// The search query string.
        query: String,

        /// Chart symbols (`EXCHANGE:SYMBOL`, comma separated) to fetch news
        /// for instead of resolving tickers from the query.
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },

    /// Resolve chart symbols for a query.
    Symbols {
        query: String,
    },

    /// Print the tag vocabulary for a category.
    Tags {
        /// `audio` or `news`.
        category: TagCategory,
    },

    /// Show document and vocabulary counts.
    Stats,

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { scope } => {
            search::run_index(&cfg, scope).await?;
        }
        Commands::Search {
            source,
            query,
            tickers,
        } => {
            search::run_search(&cfg, source, &query, tickers).await?;
        }
        Commands::Symbols { query } => {
            search::run_symbols(&cfg, &query).await?;
        }
        Commands::Tags { category } => {
            search::run_tags(&cfg, category).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
