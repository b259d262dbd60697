//! Main backend: accounts, uploads, quiz sessions.

use anyhow::Result;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderValue,
    routing::{get, patch, post},
};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::JwtKeys;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::quiz::{McpClient, QuizService, routes as quiz};
use crate::{accounts, db, health, media_ingestion};

// Several 10MB files per request.
const MAX_REQUEST_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: JwtKeys,
    pub quiz: QuizService,
    pub mcp: McpClient,
    pub upload_dir: PathBuf,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl FromRef<AppState> for QuizService {
    fn from_ref(state: &AppState) -> Self {
        state.quiz.clone()
    }
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &ServerConfig) -> Self {
        let jwt = JwtKeys::new(&config.jwt_secret);
        let mcp = McpClient::new(
            config.mcp_url.clone(),
            jwt.clone(),
            config.mcp_health_timeout,
            config.mcp_generate_timeout,
        );
        Self {
            quiz: QuizService::new(pool.clone(), mcp.clone(), config.fallback_questions_dir.clone()),
            pool,
            jwt,
            mcp,
            upload_dir: config.upload_dir.clone(),
        }
    }

    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let pool = db::create_pool(&config.database_url).await?;
        Ok(Self::new(pool, config))
    }
}

pub fn router(state: AppState, cors_origin: &str) -> Router {
    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/me", get(accounts::me))
        .route("/user/reminder-time", patch(accounts::update_reminder_time))
        .route(
            "/files",
            post(media_ingestion::handle_file_upload).get(media_ingestion::list_files),
        )
        .route("/quiz/start", post(quiz::start_quiz))
        .route("/quiz/answer", post(quiz::submit_answer))
        .route("/quiz/next", post(quiz::next_question))
        .route("/quiz/prev", post(quiz::prev_question))
        .route("/quiz/{session_id}", get(quiz::get_session));

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// `*` allows any origin; anything else is taken as the single allowed origin.
pub fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!("Invalid CORS origin {:?}, allowing any origin", origin);
            layer.allow_origin(Any)
        }
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("NOT_FOUND", "Endpoint not found")
}

/// Resolves on Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
