//! HTTP API over a shared [`RagEngine`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | `{question}` → grounded [`Answer`](crate::models::Answer) |
//! | `POST` | `/search` | `{query, limit?}` → ranked chunks |
//! | `GET`  | `/stats` | collection summary |
//! | `GET`  | `/health` | health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_unavailable` (503),
//! `index_error` / `dimension_mismatch` / `configuration` (500).
//! `/ask` itself never fails on service errors; it answers with a fallback
//! and a `status` field instead.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser chat widgets
//! can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::engine::RagEngine;
use crate::error::RagError;
use crate::models::{Answer, IndexStats, RetrievedChunk};

#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
}

/// Start the server on `[server].bind` and run until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(RagEngine::from_config(config).await?);
    let entries = engine.stats().await?.entries;
    if entries == 0 {
        tracing::warn!("index is empty; every question will get the fallback answer until `gw build` runs");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("groundwork listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, entries, "server started");

    axum::serve(listener, router(engine)).await?;
    Ok(())
}

pub fn router(engine: Arc<RagEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/search", post(handle_search))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match err {
            RagError::EmbeddingUnavailable(_) | RagError::GenerationUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        RagError::from_anyhow(err).into()
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

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    Ok(Json(state.engine.ask(&req.question).await))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievedChunk>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = req.limit.unwrap_or_else(|| state.engine.top_k());
    if k == 0 {
        return Err(bad_request("limit must be >= 1"));
    }
    let results = state.engine.retrieve(&req.query, k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(state.engine.stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::generation::DisabledGenerator;
    use crate::index::MemoryIndex;
    use crate::models::Document;
    use chrono::Utc;

    async fn spawn_server() -> String {
        let engine = RagEngine::new(
            Arc::new(MemoryIndex::new("kb")),
            Arc::new(HashProvider::new(64)),
            Arc::new(DisabledGenerator),
            &Config::default(),
        );
        engine
            .build(&[Document {
                id: "fees".to_string(),
                title: "Fees".to_string(),
                body: "Tuition fees are 1,20,000 per year.".to_string(),
                source_url: None,
                retrieved_at: Utc::now(),
                section: None,
            }])
            .await
            .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(engine))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let health: serde_json::Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let stats: serde_json::Value = client
            .get(format!("{}/stats", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["entries"], 1);
        assert_eq!(stats["collection"], "kb");
    }

    #[tokio::test]
    async fn test_search_and_ask() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let search: serde_json::Value = client
            .post(format!("{}/search", base))
            .json(&serde_json::json!({ "query": "tuition fees", "limit": 3 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(search["results"][0]["id"], "fees_0");

        let ask: serde_json::Value = client
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({ "question": "tuition fees?" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ask["status"], "generation_unavailable");
        assert_eq!(ask["confidence"], 0.0);
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({ "question": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }
}
