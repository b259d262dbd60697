use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{PDF_MIME, parse_tag_list, stored_file_name, validate_file};
use crate::auth::Claims;
use crate::db::{
    models::{FileSortField, StoredFile},
    queries,
};
use crate::error::ApiError;
use crate::processing::extract_text;
use crate::response::{ApiResponse, success};
use crate::server::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub original_name: String,
    pub size: i64,
    pub tags: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    /// Characters of text found in the PDF, when it could be read.
    pub text_length: Option<usize>,
}

struct IncomingFile {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

fn multipart_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request("INVALID_MULTIPART", format!("Failed to read multipart: {}", e))
}

/// Saves every valid PDF from the `files` fields and hands each one to the
/// document service in the background. Invalid files are skipped.
pub async fn handle_file_upload(
    State(state): State<AppState>,
    claims: Claims,
    mut multipart: Multipart,
) -> ApiResult<Vec<UploadedFile>> {
    let mut incoming = Vec::new();
    let mut tags = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or("unknown.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                incoming.push(IncomingFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            "tags" => tags = parse_tag_list(&field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    if incoming.is_empty() {
        return Err(ApiError::bad_request("NO_FILES", "No files uploaded"));
    }

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| ApiError::internal_from("UPLOAD_ERROR", "Failed to prepare upload directory", e))?;

    let mut saved = Vec::new();
    for file in incoming {
        if let Err(e) = validate_file(&file.file_name, file.content_type.as_deref(), &file.data) {
            tracing::warn!("Rejected upload {}: {}", file.file_name, e);
            continue;
        }
        match store_file(&state, &claims.sub, &tags, file).await {
            Ok(uploaded) => saved.push(uploaded),
            Err(e) => tracing::error!("Failed to store upload: {:#}", e),
        }
    }

    if saved.is_empty() {
        return Err(ApiError::bad_request(
            "PROCESSING_FAILED",
            "No files could be processed successfully. Only PDF files up to 10MB are allowed",
        ));
    }

    Ok(success(saved))
}

async fn store_file(
    state: &AppState,
    user_id: &str,
    tags: &[String],
    file: IncomingFile,
) -> anyhow::Result<UploadedFile> {
    let path = state.upload_dir.join(stored_file_name());
    tokio::fs::write(&path, &file.data).await?;

    let text_length = match extract_text(&file.data, PDF_MIME) {
        Ok(text) => Some(text.chars().count()),
        Err(e) => {
            tracing::warn!("Could not read text from {}: {}", file.file_name, e);
            None
        }
    };

    let record = StoredFile {
        id: uuid::Uuid::new_v4().to_string(),
        original_name: file.file_name,
        stored_path: path.to_string_lossy().into_owned(),
        size: file.data.len() as i64,
        mime_type: PDF_MIME.to_string(),
        tags: serde_json::to_string(tags)?,
        uploaded_at: Utc::now(),
        user_id: user_id.to_string(),
        is_processed: false,
        processed_at: None,
        chunk_count: 0,
    };

    let record = match queries::create_file(&state.pool, &record).await {
        Ok(record) => record,
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
    };

    let mcp = state.mcp.clone();
    let forward_tags = tags.to_vec();
    let (file_id, name, owner) = (record.id.clone(), record.original_name.clone(), user_id.to_string());
    let data = file.data.to_vec();
    tokio::spawn(async move {
        match mcp
            .forward_document(&owner, &file_id, &name, PDF_MIME, data, &forward_tags)
            .await
        {
            Ok(_) => tracing::info!("Document service processed file {}", file_id),
            Err(e) => tracing::error!("Document processing failed for {}: {:#}", file_id, e),
        }
    });

    Ok(UploadedFile {
        tags: record.tag_list(),
        id: record.id,
        original_name: record.original_name,
        size: record.size,
        uploaded_at: record.uploaded_at,
        text_length,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub tags: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub is_processed: bool,
    pub chunk_count: i64,
}

impl From<StoredFile> for FileSummary {
    fn from(file: StoredFile) -> Self {
        Self {
            tags: file.tag_list(),
            id: file.id,
            original_name: file.original_name,
            size: file.size,
            mime_type: file.mime_type,
            uploaded_at: file.uploaded_at,
            is_processed: file.is_processed,
            chunk_count: file.chunk_count,
        }
    }
}

pub async fn list_files(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<FileSummary>> {
    let sort = FileSortField::parse(query.sort_by.as_deref());
    let ascending = query.order.as_deref() == Some("asc");
    let tag = query.tag.as_deref().filter(|t| !t.is_empty());

    let files = queries::list_user_files(&state.pool, &claims.sub, sort, ascending, tag)
        .await
        .map_err(|e| ApiError::internal_from("LIST_ERROR", "Failed to retrieve files", e))?;

    Ok(success(files.into_iter().map(Into::into).collect()))
}
