use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// `HH:MM`, or empty when no reminder is set.
    pub quiz_reminder_time: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredFile {
    pub id: String,
    pub original_name: String,
    pub stored_path: String,
    pub size: i64,
    pub mime_type: String,
    pub tags: String,
    pub uploaded_at: DateTime<Utc>,
    pub user_id: String,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub chunk_count: i64,
}

impl StoredFile {
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QuizSessionRow {
    pub id: String,
    pub file_ids: String,
    pub tags: String,
    pub questions_json: String,
    pub current_index: i64,
    pub answers: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionSetRow {
    pub session_id: String,
    pub questions: String,
    pub source_chunks: String,
    pub tags: String,
    pub question_count: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Generating,
    Ready,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Generating => "generating",
            GenerationStatus::Ready => "ready",
            GenerationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(GenerationStatus::Generating),
            "ready" => Ok(GenerationStatus::Ready),
            "failed" => Ok(GenerationStatus::Failed),
            other => anyhow::bail!("Unknown generation status: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSortField {
    OriginalName,
    UploadedAt,
    Size,
}

impl FileSortField {
    /// Unknown fields sort by upload time.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("originalName") => FileSortField::OriginalName,
            Some("size") => FileSortField::Size,
            _ => FileSortField::UploadedAt,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            FileSortField::OriginalName => "original_name",
            FileSortField::UploadedAt => "uploaded_at",
            FileSortField::Size => "size",
        }
    }
}
