use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;

use super::fallback::{QuestionSource, fallback_questions};
use super::remote::McpClient;
use super::session::{AnswerOutcome, AnswerRecord, QuizError, QuizState};
use crate::db::queries;
use crate::questions::{Question, renumber};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedQuiz {
    pub session_id: String,
    pub total_questions: usize,
    pub current_question: Question,
    pub current_index: usize,
    pub source: QuestionSource,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub current_question: Question,
    pub current_index: usize,
    pub total_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_last_question: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_first_question: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub current_index: usize,
    pub total_questions: usize,
    pub current_question: Question,
    pub answers: Vec<Option<AnswerRecord>>,
    pub tags: Vec<String>,
    pub file_ids: Vec<String>,
}

/// Quiz lifecycle over persisted sessions. Question sourcing tries the
/// document service first and falls back to the static banks.
#[derive(Clone)]
pub struct QuizService {
    pool: SqlitePool,
    mcp: McpClient,
    fallback_dir: PathBuf,
}

impl QuizService {
    pub fn new(pool: SqlitePool, mcp: McpClient, fallback_dir: PathBuf) -> Self {
        Self {
            pool,
            mcp,
            fallback_dir,
        }
    }

    pub async fn start_session(&self, tags: Vec<String>, count: usize) -> Result<StartedQuiz, QuizError> {
        let file_ids = match tags.first() {
            Some(first) => queries::file_ids_containing_tag(&self.pool, first).await?,
            None => Vec::new(),
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let (questions, source) = self.questions_for(&session_id, &tags, count).await;

        let quiz = QuizState::new(session_id, questions, tags, file_ids)?;
        queries::create_quiz_session(&self.pool, &quiz.to_row()?).await?;
        tracing::info!(
            "Started quiz {} with {} questions ({:?})",
            quiz.id,
            quiz.question_count(),
            source
        );

        Ok(StartedQuiz {
            session_id: quiz.id.clone(),
            total_questions: quiz.question_count(),
            current_question: quiz.current_question().clone(),
            current_index: quiz.current_index,
            source,
        })
    }

    /// Never fails: generation problems are logged and replaced by a bank.
    async fn questions_for(
        &self,
        session_id: &str,
        tags: &[String],
        count: usize,
    ) -> (Vec<Question>, QuestionSource) {
        if self.mcp.health().await {
            match self.mcp.generate(session_id, tags, count).await {
                Ok(mut questions) => {
                    questions.truncate(count);
                    renumber(&mut questions);
                    return (questions, QuestionSource::Generated);
                }
                Err(e) => tracing::warn!("Remote generation failed, using fallback: {:#}", e),
            }
        } else {
            tracing::warn!(
                "Document service at {} is unavailable, using fallback questions",
                self.mcp.base_url()
            );
        }

        fallback_questions(&self.fallback_dir, tags, count).await
    }

    async fn load(&self, session_id: &str) -> Result<QuizState, QuizError> {
        let row = queries::get_quiz_session(&self.pool, session_id)
            .await?
            .ok_or(QuizError::NotFound)?;
        QuizState::from_row(row)
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        question_index: i64,
        selected_option: i64,
    ) -> Result<AnswerOutcome, QuizError> {
        let mut quiz = self.load(session_id).await?;
        let outcome = quiz.submit_answer(question_index, selected_option)?;
        queries::update_quiz_answers(&self.pool, session_id, &quiz.answers_json()?).await?;
        Ok(outcome)
    }

    pub async fn next(&self, session_id: &str) -> Result<Navigation, QuizError> {
        let mut quiz = self.load(session_id).await?;
        let index = quiz.next();
        queries::update_quiz_index(&self.pool, session_id, index as i64).await?;

        Ok(Navigation {
            current_question: quiz.current_question().clone(),
            current_index: index,
            total_questions: quiz.question_count(),
            is_last_question: Some(quiz.is_last()),
            is_first_question: None,
        })
    }

    pub async fn prev(&self, session_id: &str) -> Result<Navigation, QuizError> {
        let mut quiz = self.load(session_id).await?;
        let index = quiz.prev();
        queries::update_quiz_index(&self.pool, session_id, index as i64).await?;

        Ok(Navigation {
            current_question: quiz.current_question().clone(),
            current_index: index,
            total_questions: quiz.question_count(),
            is_last_question: None,
            is_first_question: Some(quiz.is_first()),
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionView, QuizError> {
        let quiz = self.load(session_id).await?;
        Ok(SessionView {
            current_question: quiz.current_question().clone(),
            total_questions: quiz.question_count(),
            session_id: quiz.id,
            created_at: quiz.created_at,
            current_index: quiz.current_index,
            answers: quiz.answers,
            tags: quiz.tags,
            file_ids: quiz.file_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtKeys;
    use crate::db::create_pool;
    use axum::{Json, Router, http::StatusCode, routing::{get, post}};
    use serde_json::{Value, json};
    use std::time::Duration;

    async fn service(dir: &std::path::Path) -> QuizService {
        service_at("http://127.0.0.1:9", dir).await
    }

    async fn service_at(url: &str, dir: &std::path::Path) -> QuizService {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let mcp = McpClient::new(
            url,
            JwtKeys::new("secret"),
            Duration::from_millis(500),
            Duration::from_secs(1),
        );
        QuizService::new(pool, mcp, dir.to_path_buf())
    }

    fn bank_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/questions")
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_generated_questions_are_truncated_and_renumbered() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/api/questions/generate",
                post(|| async {
                    let questions: Vec<Value> = (7..10)
                        .map(|id| {
                            json!({
                                "id": id,
                                "question": format!("Generated {}?", id),
                                "options": ["a", "b", "c", "d"],
                                "correctAnswer": 2
                            })
                        })
                        .collect();
                    Json(json!({"success": true, "data": {"questions": questions}}))
                }),
            );
        let url = spawn(app).await;
        let quiz = service_at(&url, &bank_dir()).await;

        let started = quiz.start_session(vec!["sql".into()], 2).await.unwrap();
        assert_eq!(started.source, QuestionSource::Generated);
        assert_eq!(started.total_questions, 2);
        assert_eq!(started.current_question.id, 1);
        assert_eq!(started.current_question.question, "Generated 7?");
    }

    #[tokio::test]
    async fn test_unavailable_generator_uses_topic_bank() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/api/questions/generate",
                post(|| async {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({
                            "success": false,
                            "error": {"message": "Mixtral not configured", "code": "MIXTRAL_UNAVAILABLE"}
                        })),
                    )
                }),
            );
        let url = spawn(app).await;
        let quiz = service_at(&url, &bank_dir()).await;

        let started = quiz.start_session(vec!["sql".into()], 2).await.unwrap();
        assert_eq!(started.source, QuestionSource::Fallback);
        assert_eq!(started.total_questions, 2);
        assert_eq!(started.current_question.id, 1);

        let view = quiz.get_session(&started.session_id).await.unwrap();
        assert_eq!(view.tags, vec!["sql".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let quiz = service(dir.path()).await;

        let started = quiz.start_session(vec!["history".into()], 4).await.unwrap();
        assert_eq!(started.source, QuestionSource::Generic);
        assert_eq!(started.total_questions, 4);
        assert_eq!(started.current_index, 0);
        assert_eq!(started.current_question.id, 1);
    }

    #[tokio::test]
    async fn test_navigation_and_answers_persist() {
        let dir = tempfile::tempdir().unwrap();
        let quiz = service(dir.path()).await;
        let started = quiz.start_session(Vec::new(), 3).await.unwrap();
        let id = started.session_id;

        let back = quiz.prev(&id).await.unwrap();
        assert_eq!(back.current_index, 0);
        assert_eq!(back.is_first_question, Some(true));

        quiz.next(&id).await.unwrap();
        let last = quiz.next(&id).await.unwrap();
        assert_eq!(last.current_index, 2);
        assert_eq!(last.is_last_question, Some(true));
        assert_eq!(quiz.next(&id).await.unwrap().current_index, 2);

        let view = quiz.get_session(&id).await.unwrap();
        let correct = view.current_question.correct_answer as i64;
        let outcome = quiz.submit_answer(&id, 2, correct).await.unwrap();
        assert!(outcome.is_correct);

        let view = quiz.get_session(&id).await.unwrap();
        assert_eq!(view.current_index, 2);
        assert_eq!(view.answers.len(), 3);
        assert!(view.answers[0].is_none());
        assert!(view.answers[2].as_ref().unwrap().is_correct);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let quiz = service(dir.path()).await;
        assert!(matches!(quiz.next("missing").await, Err(QuizError::NotFound)));
        assert!(matches!(
            quiz.submit_answer("missing", 0, 0).await,
            Err(QuizError::NotFound)
        ));
    }
}
