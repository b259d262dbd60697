use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::*;

pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    quiz_reminder_time: &str,
) -> Result<User> {
    let now = Utc::now();
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, password_hash, quiz_reminder_time, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(email)
    .bind(password_hash)
    .bind(quiz_reminder_time)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

pub async fn get_user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

pub async fn update_reminder_time(pool: &SqlitePool, id: &str, time: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET quiz_reminder_time = ?, updated_at = ? WHERE id = ?")
        .bind(time)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn users_with_reminder_at(pool: &SqlitePool, hhmm: &str) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE quiz_reminder_time = ?")
        .bind(hhmm)
        .fetch_all(pool)
        .await?;

    Ok(users)
}

pub async fn create_file(pool: &SqlitePool, file: &StoredFile) -> Result<StoredFile> {
    let file = sqlx::query_as::<_, StoredFile>(
        "INSERT INTO files (id, original_name, stored_path, size, mime_type, tags, uploaded_at, user_id, is_processed, processed_at, chunk_count)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&file.id)
    .bind(&file.original_name)
    .bind(&file.stored_path)
    .bind(file.size)
    .bind(&file.mime_type)
    .bind(&file.tags)
    .bind(file.uploaded_at)
    .bind(&file.user_id)
    .bind(file.is_processed)
    .bind(file.processed_at)
    .bind(file.chunk_count)
    .fetch_one(pool)
    .await?;

    Ok(file)
}

pub async fn get_file_by_id(pool: &SqlitePool, file_id: &str) -> Result<Option<StoredFile>> {
    let file = sqlx::query_as::<_, StoredFile>("SELECT * FROM files WHERE id = ?")
        .bind(file_id)
        .fetch_optional(pool)
        .await?;

    Ok(file)
}

pub async fn get_user_files(pool: &SqlitePool, user_id: &str) -> Result<Vec<StoredFile>> {
    let files = sqlx::query_as::<_, StoredFile>(
        "SELECT * FROM files WHERE user_id = ? ORDER BY uploaded_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(files)
}

/// Lists a user's files. `tag` matches the quoted tag inside the JSON column.
pub async fn list_user_files(
    pool: &SqlitePool,
    user_id: &str,
    sort: FileSortField,
    ascending: bool,
    tag: Option<&str>,
) -> Result<Vec<StoredFile>> {
    let direction = if ascending { "ASC" } else { "DESC" };
    let sql = format!(
        "SELECT * FROM files WHERE user_id = ? AND (? IS NULL OR tags LIKE '%' || ? || '%') ORDER BY {} {}",
        sort.column(),
        direction
    );
    let quoted = tag.map(|t| format!("\"{}\"", t));

    let files = sqlx::query_as::<_, StoredFile>(&sql)
        .bind(user_id)
        .bind(&quoted)
        .bind(&quoted)
        .fetch_all(pool)
        .await?;

    Ok(files)
}

/// Ids of files whose tag column contains `tag` as a substring.
pub async fn file_ids_containing_tag(pool: &SqlitePool, tag: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT id FROM files WHERE tags LIKE '%' || ? || '%' ORDER BY uploaded_at DESC",
    )
    .bind(tag)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

pub async fn mark_file_processed(pool: &SqlitePool, file_id: &str, chunk_count: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE files SET is_processed = 1, processed_at = ?, chunk_count = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(chunk_count)
    .bind(file_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingCounts {
    pub total_documents: i64,
    pub processed_documents: i64,
    pub total_chunks: i64,
}

pub async fn processing_counts(pool: &SqlitePool) -> Result<ProcessingCounts> {
    let (total_documents, processed_documents, total_chunks): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN is_processed THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(chunk_count), 0)
         FROM files",
    )
    .fetch_one(pool)
    .await?;

    Ok(ProcessingCounts {
        total_documents,
        processed_documents,
        total_chunks,
    })
}

pub async fn create_quiz_session(pool: &SqlitePool, session: &QuizSessionRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO quiz_sessions (id, file_ids, tags, questions_json, current_index, answers, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(&session.file_ids)
    .bind(&session.tags)
    .bind(&session.questions_json)
    .bind(session.current_index)
    .bind(&session.answers)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_quiz_session(pool: &SqlitePool, id: &str) -> Result<Option<QuizSessionRow>> {
    let session = sqlx::query_as::<_, QuizSessionRow>("SELECT * FROM quiz_sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(session)
}

pub async fn update_quiz_answers(pool: &SqlitePool, id: &str, answers_json: &str) -> Result<()> {
    sqlx::query("UPDATE quiz_sessions SET answers = ?, updated_at = ? WHERE id = ?")
        .bind(answers_json)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_quiz_index(pool: &SqlitePool, id: &str, current_index: i64) -> Result<()> {
    sqlx::query("UPDATE quiz_sessions SET current_index = ?, updated_at = ? WHERE id = ?")
        .bind(current_index)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Creates the set row on first use so a session can be marked before it is saved.
pub async fn upsert_question_set_status(
    pool: &SqlitePool,
    session_id: &str,
    status: GenerationStatus,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO generated_question_sets (session_id, status, created_at, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (session_id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
    )
    .bind(session_id)
    .bind(status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn save_question_set(
    pool: &SqlitePool,
    session_id: &str,
    questions_json: &str,
    source_chunks_json: &str,
    tags_json: &str,
    question_count: i64,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO generated_question_sets (session_id, questions, source_chunks, tags, question_count, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 'ready', ?, ?)
         ON CONFLICT (session_id) DO UPDATE SET
            questions = excluded.questions,
            source_chunks = excluded.source_chunks,
            tags = excluded.tags,
            question_count = excluded.question_count,
            status = 'ready',
            updated_at = excluded.updated_at",
    )
    .bind(session_id)
    .bind(questions_json)
    .bind(source_chunks_json)
    .bind(tags_json)
    .bind(question_count)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_question_set(pool: &SqlitePool, session_id: &str) -> Result<Option<QuestionSetRow>> {
    let row = sqlx::query_as::<_, QuestionSetRow>(
        "SELECT * FROM generated_question_sets WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn recent_ready_sets_containing(
    pool: &SqlitePool,
    tag: &str,
    limit: i64,
) -> Result<Vec<QuestionSetRow>> {
    let rows = sqlx::query_as::<_, QuestionSetRow>(
        "SELECT * FROM generated_question_sets
         WHERE status = 'ready' AND tags LIKE '%' || ? || '%'
         ORDER BY created_at DESC
         LIMIT ?",
    )
    .bind(tag)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuestionSetCounts {
    pub total_sets: i64,
    pub ready_sets: i64,
    pub generating_sets: i64,
    pub failed_sets: i64,
    pub total_questions: i64,
}

pub async fn question_set_counts(pool: &SqlitePool) -> Result<QuestionSetCounts> {
    let (total_sets, ready_sets, generating_sets, failed_sets, total_questions): (
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'ready' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'generating' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'ready' THEN question_count ELSE 0 END), 0)
         FROM generated_question_sets",
    )
    .fetch_one(pool)
    .await?;

    Ok(QuestionSetCounts {
        total_sets,
        ready_sets,
        generating_sets,
        failed_sets,
        total_questions,
    })
}
