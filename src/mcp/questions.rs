use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::McpState;
use crate::auth::Claims;
use crate::db::models::GenerationStatus;
use crate::error::{ApiError, ApiJson};
use crate::generation::QuestionGenerationRequest;
use crate::generation::history::{DUPLICATE_THRESHOLD, QuestionSet, QuestionSetStats, fill_to_count};
use crate::questions::{Difficulty, Question, renumber};
use crate::request_counter::RequestStats;
use crate::response::{ApiResponse, success};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

const MAX_CONTEXTS: usize = 20;
const MAX_QUESTION_COUNT: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub semantic_query: Option<String>,
}

fn default_question_count() -> usize {
    5
}

fn default_difficulty() -> Difficulty {
    Difficulty::Mixed
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub session_id: String,
    pub questions: Vec<Question>,
    pub question_count: usize,
    pub source_contexts: usize,
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub generated_at: DateTime<Utc>,
}

/// Marks the session `generating`, then either saves a ready set or marks
/// it `failed`. A missing or failing model answers 503 `MIXTRAL_UNAVAILABLE`
/// so callers can fall back.
pub async fn generate_questions(
    State(state): State<McpState>,
    _claims: Claims,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> ApiResult<GenerateResponse> {
    if req.tags.is_empty() {
        return Err(ApiError::bad_request("MISSING_TAGS", "Tags array is required"));
    }
    let session_id = req
        .session_id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_SESSION_ID", "Session ID is required"))?;
    if req.question_count == 0 || req.question_count > MAX_QUESTION_COUNT {
        return Err(ApiError::bad_request(
            "INVALID_QUESTION_COUNT",
            format!("questionCount must be between 1 and {}", MAX_QUESTION_COUNT),
        ));
    }

    tracing::info!(
        "Generating {} questions for session {} with tags: {}",
        req.question_count,
        session_id,
        req.tags.join(", ")
    );

    state
        .history
        .update_status(&session_id, GenerationStatus::Generating)
        .await
        .map_err(|e| ApiError::internal_from("GENERATION_ERROR", "Question generation failed", e))?;

    let result = run_generation(&state, &session_id, &req).await;
    if result.is_err() {
        if let Err(e) = state
            .history
            .update_status(&session_id, GenerationStatus::Failed)
            .await
        {
            tracing::error!("Failed to mark session {} as failed: {}", session_id, e);
        }
    }

    result.map(success)
}

async fn run_generation(
    state: &McpState,
    session_id: &str,
    req: &GenerateRequest,
) -> Result<GenerateResponse, ApiError> {
    let max_contexts = (req.question_count * 2).min(MAX_CONTEXTS);
    let contexts = state
        .search
        .relevant_contexts(&req.tags, max_contexts, req.semantic_query.as_deref())
        .await
        .map_err(|e| ApiError::internal_from("GENERATION_ERROR", "Question generation failed", e))?;

    if contexts.is_empty() {
        return Err(ApiError::bad_request(
            "NO_CONTEXT",
            "No relevant content found for the specified tags. Please upload documents or try different tags.",
        ));
    }
    tracing::info!("Found {} relevant contexts for question generation", contexts.len());

    let unavailable = |reason: String| ApiError::Unavailable {
        code: "MIXTRAL_UNAVAILABLE",
        message: "AI question generation temporarily unavailable".to_string(),
        details: Some(json!({ "reason": reason })),
    };

    if !state.generator.is_configured() {
        return Err(unavailable("Mixtral not configured".to_string()));
    }

    let request = QuestionGenerationRequest {
        contexts: contexts.iter().map(|c| c.content.clone()).collect(),
        tags: req.tags.clone(),
        question_count: req.question_count,
        difficulty: req.difficulty,
    };
    let generated = state.generator.generate(&request).await.map_err(|e| {
        tracing::error!("Mixtral generation failed: {:#}", e);
        unavailable(e.to_string())
    })?;

    let outcome = state
        .history
        .avoid_duplicates(generated, &req.tags, DUPLICATE_THRESHOLD)
        .await;
    let mut questions = fill_to_count(outcome, req.question_count);
    renumber(&mut questions);

    let source_chunks: Vec<String> = contexts.iter().map(|c| c.id.clone()).collect();
    state
        .history
        .save_set(session_id, &questions, &req.tags, &source_chunks)
        .await
        .map_err(|e| ApiError::internal_from("GENERATION_ERROR", "Question generation failed", e))?;

    Ok(GenerateResponse {
        session_id: session_id.to_string(),
        question_count: questions.len(),
        questions,
        source_contexts: contexts.len(),
        tags: req.tags.clone(),
        difficulty: req.difficulty,
        generated_at: Utc::now(),
    })
}

pub async fn question_set(
    State(state): State<McpState>,
    _claims: Claims,
    Path(session_id): Path<String>,
) -> ApiResult<QuestionSet> {
    let set = state
        .history
        .get_set(&session_id)
        .await
        .map_err(|e| ApiError::internal_from("HISTORY_ERROR", "Failed to get question set", e))?
        .ok_or_else(|| ApiError::not_found("SET_NOT_FOUND", "Question set not found"))?;

    Ok(success(set))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatusResponse {
    pub session_id: String,
    pub status: GenerationStatus,
    pub question_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn generation_status(
    State(state): State<McpState>,
    _claims: Claims,
    Path(session_id): Path<String>,
) -> ApiResult<GenerationStatusResponse> {
    let set = state
        .history
        .get_set(&session_id)
        .await
        .map_err(|e| ApiError::internal_from("HISTORY_ERROR", "Failed to get session status", e))?
        .ok_or_else(|| ApiError::not_found("SESSION_NOT_FOUND", "Session not found"))?;

    Ok(success(GenerationStatusResponse {
        session_id,
        status: set.status,
        question_count: set.questions.len(),
        created_at: set.created_at,
        updated_at: set.updated_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct ConnectionTest {
    pub configured: bool,
    pub connection: bool,
    pub message: &'static str,
}

pub async fn test_mixtral(State(state): State<McpState>, _claims: Claims) -> Json<ApiResponse<ConnectionTest>> {
    if !state.generator.is_configured() {
        return success(ConnectionTest {
            configured: false,
            connection: false,
            message: "Mixtral API key not configured",
        });
    }

    let connection = state.generator.test_connection().await;
    success(ConnectionTest {
        configured: true,
        connection,
        message: if connection {
            "Mixtral connection successful"
        } else {
            "Mixtral connection failed"
        },
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStats {
    #[serde(flatten)]
    pub sets: QuestionSetStats,
    pub mixtral_configured: bool,
    pub api_requests: RequestStats,
}

pub async fn question_stats(State(state): State<McpState>, _claims: Claims) -> ApiResult<QuestionStats> {
    let sets = state
        .history
        .stats()
        .await
        .map_err(|e| ApiError::internal_from("STATS_ERROR", "Failed to get question stats", e))?;

    Ok(success(QuestionStats {
        sets,
        mixtral_configured: state.generator.is_configured(),
        api_requests: state.counter.snapshot(),
    }))
}
