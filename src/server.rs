//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Podcast episodes for a query, with summaries |
//! | `POST` | `/api/news` | Sentiment-scored news for a query |
//! | `POST` | `/api/chart-symbols` | Chart symbol groups for a query |
//! | `POST` | `/api/indexing` | Run an indexing pass |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_tickers", "message": "no tickers could be resolved for the query" } }
//! ```
//!
//! Error codes: `bad_request` (400), `no_tickers` (422), `configuration` (500),
//! `upstream` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser front end
//! can be served from anywhere.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::ingest::IngestScope;
use crate::models::ContentDocument;
use crate::service::{QueryService, ReindexResponse};

#[derive(Clone)]
struct AppState {
    service: Arc<QueryService>,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = QueryService::from_config(config).await?;
    let app = router(Arc::new(service));

    tracing::info!(bind = %config.server.bind, "server listening");
    println!("finsight server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes over an already-built service.
pub fn router(service: Arc<QueryService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_podcast_query))
        .route("/api/news", post(handle_news_query))
        .route("/api/chart-symbols", post(handle_chart_symbols))
        .route("/api/indexing", post(handle_indexing))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match (&err, err.kind()) {
            (Error::NoTickers, _) => (StatusCode::UNPROCESSABLE_ENTITY, "no_tickers"),
            (_, ErrorKind::Input) => (StatusCode::BAD_REQUEST, "bad_request"),
            (_, ErrorKind::Configuration) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            (_, ErrorKind::Upstream) | (_, ErrorKind::Contract) => {
                (StatusCode::BAD_GATEWAY, "upstream")
            }
            (_, ErrorKind::Storage) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodcastResponse {
    podcast_documents: Vec<ContentDocument>,
}

async fn handle_podcast_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<PodcastResponse>, AppError> {
    let Json(req) = payload?;
    let query = non_empty(&req.query)?;
    let podcast_documents = state.service.podcast_query(query).await?;
    Ok(Json(PodcastResponse { podcast_documents }))
}

// ============ POST /api/news ============

#[derive(Deserialize)]
struct NewsRequest {
    query: String,
    #[serde(default)]
    tickers: Option<Vec<Vec<String>>>,
}

#[derive(Serialize)]
struct NewsResponse {
    news: Vec<ContentDocument>,
}

async fn handle_news_query(
    State(state): State<AppState>,
    payload: Result<Json<NewsRequest>, JsonRejection>,
) -> Result<Json<NewsResponse>, AppError> {
    let Json(req) = payload?;
    let query = non_empty(&req.query)?;
    let news = state.service.news_query(query, req.tickers).await?;
    Ok(Json(NewsResponse { news }))
}

// ============ POST /api/chart-symbols ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartSymbolsResponse {
    stock_symbols: Vec<Vec<String>>,
}

async fn handle_chart_symbols(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ChartSymbolsResponse>, AppError> {
    let Json(req) = payload?;
    let stock_symbols = state.service.chart_symbols(&req.query).await?;
    Ok(Json(ChartSymbolsResponse { stock_symbols }))
}

// ============ POST /api/indexing ============

#[derive(Deserialize, Default)]
struct IndexingRequest {
    #[serde(default)]
    scope: Option<String>,
}

async fn handle_indexing(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ReindexResponse>), AppError> {
    // The body is optional; an empty POST reindexes everything.
    let req: IndexingRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IndexingRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(e.to_string()))?
    };
    let scope = match req.scope.as_deref() {
        None | Some("") => IngestScope::All,
        Some(s) => s.parse::<IngestScope>().map_err(bad_request)?,
    };

    let response = state.service.trigger_reindex(scope).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(response)))
}

fn non_empty(query: &str) -> Result<&str, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(query)
}
