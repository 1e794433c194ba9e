//! # finsight
//!
//! Tag-driven retrieval and indexing over financial podcasts and news.
//!
//! Podcast episodes are transcribed, news articles are pulled with their
//! sentiment scores, and both are tagged from a controlled vocabulary and
//! embedded into per-source collections. Queries are mapped onto that
//! vocabulary first, then answered with a tag-filtered similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────┐   ┌────────────┐
//! │   Sources    │──▶│      ContentIngestor      │──▶│   SQLite   │
//! │ iTunes / RSS │   │ transcribe → tag → embed │   │ collections│
//! │ Alpha Vantage│   └──────────────────────────┘   │ + tag vocab│
//! └──────────────┘                                   └─────┬──────┘
//!                                                          │
//!                         ┌────────────────────────────────┤
//!                         ▼                                ▼
//!                   ┌──────────┐                     ┌──────────┐
//!                   │   CLI    │                     │   HTTP   │
//!                   │  (fins)  │                     │  (axum)  │
//!                   └──────────┘                     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fins init                                  # create database
//! fins index all                             # fetch, transcribe, tag, embed
//! fins search podcasts "rate cuts and bank stocks"
//! fins serve                                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed library errors |
//! | [`models`] | Core data types |
//! | [`http`] | Shared upstream retry policy |
//! | [`llm`] | Chat-completion client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Tag vocabulary and vector storage |
//! | [`tagging`] | Tag extraction and query resolution |
//! | [`symbols`] | Chart symbols and sentiment tickers |
//! | [`retrieve`] | Batched storage and filtered retrieval |
//! | [`summary`] | Per-result relevance summaries |
//! | [`sources`] | Podcast directory, RSS and news feeds |
//! | [`transcribe`] | Batch speech-to-text |
//! | [`staging`] | Optional S3 re-hosting of audio |
//! | [`ingest`] | Indexing pipeline |
//! | [`service`] | Query operations shared by CLI and server |
//! | [`server`] | HTTP API |
//! | [`search`] | CLI front ends |
//! | [`stats`] | Database statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod search;
pub mod server;
pub mod service;
pub mod sources;
pub mod staging;
pub mod stats;
pub mod store;
pub mod summary;
pub mod symbols;
pub mod tagging;
pub mod transcribe;
