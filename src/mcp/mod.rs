//! Document and question service: ingestion, vector search and generation.

pub mod documents;
pub mod questions;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRef, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::JwtKeys;
use crate::config::McpConfig;
use crate::db;
use crate::embeddings::{self, EmbeddingProvider};
use crate::error::ApiError;
use crate::generation::{MixtralGenerator, QuestionGenerator, QuestionHistory};
use crate::processing::Chunker;
use crate::rag::{self, VectorSearchProvider, VectorStore};
use crate::request_counter::RequestCounter;
use crate::response::ApiResponse;
use crate::server::cors_layer;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct McpState {
    pub pool: SqlitePool,
    pub jwt: JwtKeys,
    pub chunker: Chunker,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub search: VectorSearchProvider,
    pub generator: Arc<dyn QuestionGenerator>,
    pub history: QuestionHistory,
    pub counter: RequestCounter,
}

impl FromRef<McpState> for JwtKeys {
    fn from_ref(state: &McpState) -> Self {
        state.jwt.clone()
    }
}

impl McpState {
    pub fn new(
        pool: SqlitePool,
        jwt: JwtKeys,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        generator: Arc<dyn QuestionGenerator>,
        counter: RequestCounter,
    ) -> Self {
        Self {
            search: VectorSearchProvider::new(vector_store.clone(), embedder.clone()),
            history: QuestionHistory::new(pool.clone()),
            pool,
            jwt,
            chunker,
            embedder,
            vector_store,
            generator,
            counter,
        }
    }

    pub async fn from_config(config: &McpConfig, counter: RequestCounter) -> Result<Self> {
        let pool = db::create_pool(&config.database_url).await?;
        let embedder = embeddings::create_provider(&config.embedding, counter.clone())?;
        let vector_store = rag::create_store(&config.vector_store)?;
        let generator: Arc<dyn QuestionGenerator> =
            Arc::new(MixtralGenerator::new(&config.generator, counter.clone()));

        tracing::info!(
            "Document service using {} vector store, embeddings model {}",
            vector_store.backend_name(),
            embedder.model_name()
        );

        Ok(Self::new(
            pool,
            JwtKeys::new(&config.jwt_secret),
            Chunker::new(config.chunking),
            embedder,
            vector_store,
            generator,
            counter,
        ))
    }
}

pub fn router(state: McpState, cors_origin: &str) -> Router {
    let api = Router::new()
        .route("/documents/process", post(documents::process_document))
        .route("/documents/search", post(documents::search_documents))
        .route("/documents/metadata/{id}", get(documents::document_metadata))
        .route("/documents/user/{user_id}", get(documents::user_documents))
        .route("/documents/stats", get(documents::processing_stats))
        .route("/questions/generate", post(questions::generate_questions))
        .route("/questions/session/{session_id}", get(questions::question_set))
        .route("/questions/status/{session_id}", get(questions::generation_status))
        .route("/questions/test-mixtral", get(questions::test_mixtral))
        .route("/questions/stats", get(questions::question_stats));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ServiceStatuses {
    chroma: &'static str,
    embeddings: &'static str,
    mixtral: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    services: ServiceStatuses,
    vector_backend: &'static str,
    version: &'static str,
}

fn healthy(ok: bool) -> &'static str {
    if ok { "healthy" } else { "unhealthy" }
}

/// 200 when both the vector store and the embedder respond, 503 otherwise.
async fn health(State(state): State<McpState>) -> impl IntoResponse {
    let store_ok = state.vector_store.health_check().await;
    let embeddings_ok = state.embedder.health_check().await;
    let all_ok = store_ok && embeddings_ok;

    let report = HealthReport {
        status: if all_ok { "healthy" } else { "degraded" },
        services: ServiceStatuses {
            chroma: healthy(store_ok),
            embeddings: healthy(embeddings_ok),
            mixtral: if state.generator.is_configured() {
                "configured"
            } else {
                "not-configured"
            },
        },
        vector_backend: state.vector_store.backend_name(),
        version: env!("CARGO_PKG_VERSION"),
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::ok(report)))
}

async fn not_found() -> ApiError {
    ApiError::not_found("NOT_FOUND", "Endpoint not found")
}
