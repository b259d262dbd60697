use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::McpState;
use crate::auth::Claims;
use crate::db::{models::StoredFile, queries};
use crate::embeddings::embed_batch;
use crate::error::{ApiError, ApiJson};
use crate::processing::{ChunkSource, ExtractError, extract_text, resolve_mime};
use crate::rag::search::{ContextResult, topics_query};
use crate::rag::vector_store::{VectorDocument, chunk_metadata};
use crate::request_counter::RequestStats;
use crate::response::{ApiResponse, success};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub file_id: String,
    pub original_name: String,
    pub chunks_created: usize,
    pub total_tokens: usize,
    pub text_length: usize,
    /// Milliseconds.
    pub processing_time: u64,
}

struct Upload {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

/// Accepts a JSON list (`["a","b"]`) or a comma separated list.
fn parse_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
}

fn multipart_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request("INVALID_MULTIPART", format!("Invalid multipart body: {}", e))
}

pub async fn process_document(
    State(state): State<McpState>,
    claims: Claims,
    mut multipart: Multipart,
) -> ApiResult<ProcessResponse> {
    let started = Instant::now();
    let mut upload: Option<Upload> = None;
    let mut tags = Vec::new();
    let mut known_file_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload {
                    file_name,
                    content_type,
                    data,
                });
            }
            "tags" => tags = parse_tags(&field.text().await.map_err(multipart_error)?),
            "fileId" => {
                let id = field.text().await.map_err(multipart_error)?;
                known_file_id = Some(id.trim().to_string()).filter(|id| !id.is_empty());
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("NO_FILE", "No file provided"))?;
    tracing::info!("Processing file: {} for user: {}", upload.file_name, claims.sub);

    let mime_type = resolve_mime(upload.content_type.as_deref(), &upload.file_name);
    let text = extract_text(&upload.data, &mime_type).map_err(|e| match e {
        ExtractError::Empty => {
            ApiError::bad_request("NO_TEXT", "No text could be extracted from file")
        }
        ExtractError::Unsupported(_) => ApiError::bad_request("UNSUPPORTED_FILE_TYPE", e.to_string()),
        ExtractError::Pdf(_) => ApiError::bad_request("EXTRACTION_FAILED", e.to_string()),
    })?;

    let file_id = known_file_id.clone().unwrap_or_else(|| {
        format!("temp_{}_{}", Utc::now().timestamp_millis(), claims.sub)
    });
    let source = ChunkSource {
        file_id: file_id.clone(),
        original_name: Some(upload.file_name.clone()),
        mime_type: Some(mime_type),
        tags,
        user_id: Some(claims.sub.clone()),
    };

    let chunks = state.chunker.chunk_text(&text, &source);
    tracing::info!("Created {} chunks from {}", chunks.len(), upload.file_name);

    let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embed_batch(state.embedder.as_ref(), &contents)
        .await
        .map_err(|e| ApiError::internal_from("PROCESSING_ERROR", "Document processing failed", e))?;
    let total_tokens: usize = embeddings.iter().map(|e| e.tokens).sum();

    let documents: Vec<VectorDocument> = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, result)| VectorDocument {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            embedding: result.embedding,
            metadata: chunk_metadata(&chunk.metadata),
        })
        .collect();

    state
        .vector_store
        .add_documents(documents)
        .await
        .map_err(|e| ApiError::internal_from("PROCESSING_ERROR", "Document processing failed", e))?;

    if let Some(id) = &known_file_id {
        match queries::mark_file_processed(&state.pool, id, chunks.len() as i64).await {
            Ok(true) => tracing::debug!("Marked file {} as processed", id),
            Ok(false) => tracing::debug!("File {} is not tracked, skipping processed flag", id),
            Err(e) => tracing::warn!("Could not mark file {} as processed: {}", id, e),
        }
    }

    Ok(success(ProcessResponse {
        file_id,
        original_name: upload.file_name,
        chunks_created: chunks.len(),
        total_tokens,
        text_length: text.chars().count(),
        processing_time: started.elapsed().as_millis() as u64,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<ContextResult>,
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub count: usize,
}

pub async fn search_documents(
    State(state): State<McpState>,
    _claims: Claims,
    ApiJson(req): ApiJson<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let query = req.query.filter(|q| !q.trim().is_empty());
    if query.is_none() && req.tags.is_empty() {
        return Err(ApiError::bad_request("MISSING_QUERY", "Query or tags required"));
    }

    let text = query.clone().unwrap_or_else(|| topics_query(&req.tags));
    let filter = (!req.tags.is_empty()).then_some(req.tags.as_slice());
    let results = state
        .search
        .search_by_text(&text, req.max_results, filter)
        .await
        .map_err(|e| ApiError::internal_from("SEARCH_ERROR", "Document search failed", e))?;

    Ok(success(SearchResponse {
        count: results.len(),
        results,
        query,
        tags: req.tags,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub tags: Vec<String>,
    pub size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub user_id: String,
    pub chunk_count: i64,
    pub is_processed: bool,
}

impl From<StoredFile> for DocumentMetadata {
    fn from(file: StoredFile) -> Self {
        let filename = std::path::Path::new(&file.stored_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.stored_path.clone());
        Self {
            tags: file.tag_list(),
            id: file.id,
            filename,
            original_name: file.original_name,
            size: file.size,
            mime_type: file.mime_type,
            uploaded_at: file.uploaded_at,
            user_id: file.user_id,
            chunk_count: file.chunk_count,
            is_processed: file.is_processed,
        }
    }
}

pub async fn document_metadata(
    State(state): State<McpState>,
    _claims: Claims,
    Path(id): Path<String>,
) -> ApiResult<DocumentMetadata> {
    let file = queries::get_file_by_id(&state.pool, &id)
        .await
        .map_err(|e| {
            ApiError::internal_from("METADATA_ERROR", "Failed to get document metadata", e)
        })?
        .ok_or_else(|| ApiError::not_found("DOCUMENT_NOT_FOUND", "Document not found"))?;

    Ok(success(file.into()))
}

#[derive(Debug, Serialize)]
pub struct UserDocuments {
    pub documents: Vec<DocumentMetadata>,
    pub count: usize,
}

/// Callers may only list their own documents.
pub async fn user_documents(
    State(state): State<McpState>,
    claims: Claims,
    Path(user_id): Path<String>,
) -> ApiResult<UserDocuments> {
    if user_id != claims.sub {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }

    let files = queries::get_user_files(&state.pool, &user_id)
        .await
        .map_err(|e| ApiError::internal_from("METADATA_ERROR", "Failed to get user documents", e))?;
    let documents: Vec<DocumentMetadata> = files.into_iter().map(Into::into).collect();

    Ok(success(UserDocuments {
        count: documents.len(),
        documents,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total_documents: i64,
    pub processed_documents: i64,
    pub total_chunks: i64,
    pub vector_documents: usize,
    pub chunking_config: ChunkingSettings,
    pub api_requests: RequestStats,
}

pub async fn processing_stats(
    State(state): State<McpState>,
    _claims: Claims,
) -> ApiResult<ProcessingStats> {
    let counts = queries::processing_counts(&state.pool)
        .await
        .map_err(|e| ApiError::internal_from("STATS_ERROR", "Failed to get processing stats", e))?;
    let config = state.chunker.config();

    Ok(success(ProcessingStats {
        total_documents: counts.total_documents,
        processed_documents: counts.processed_documents,
        total_chunks: counts.total_chunks,
        vector_documents: state.vector_store.count().await,
        chunking_config: ChunkingSettings {
            chunk_size: config.chunk_size,
            overlap_size: config.overlap_size,
        },
        api_requests: state.counter.snapshot(),
    }))
}
