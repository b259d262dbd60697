use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::Value;

use super::service::{Navigation, QuizService, SessionView, StartedQuiz};
use super::session::{AnswerOutcome, QuizError};
use crate::error::{ApiError, ApiJson};
use crate::response::{ApiResponse, success};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

const DEFAULT_QUESTION_COUNT: usize = 10;
const MAX_QUESTION_COUNT: usize = 50;

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::NotFound => ApiError::not_found("SESSION_NOT_FOUND", "Quiz session not found"),
            QuizError::InvalidQuestionIndex => {
                ApiError::bad_request("INVALID_QUESTION_INDEX", "Invalid question index")
            }
            QuizError::Empty => {
                ApiError::internal("QUIZ_START_ERROR", "Quiz session has no questions")
            }
            QuizError::Storage(e) => {
                ApiError::internal_from("QUIZ_STORAGE_ERROR", "Quiz storage failed", format!("{:#}", e))
            }
        }
    }
}

/// Bodies are taken as raw JSON so that wrong field types map to the
/// documented error codes instead of a generic rejection.
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => None,
    }
}

fn session_id(body: &Value) -> Result<String, ApiError> {
    body.get("sessionId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("MISSING_SESSION_ID", "Session ID is required"))
}

pub async fn start_quiz(
    State(quiz): State<QuizService>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<StartedQuiz> {
    let invalid = || {
        ApiError::bad_request(
            "INVALID_INPUT",
            format!(
                "tags must be an array of strings and questionCount a number between 1 and {}",
                MAX_QUESTION_COUNT
            ),
        )
    };

    let tags = string_list(body.get("tags")).ok_or_else(invalid)?;
    let count = match body.get("questionCount") {
        None | Some(Value::Null) => DEFAULT_QUESTION_COUNT,
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .filter(|n| (1..=MAX_QUESTION_COUNT).contains(n))
            .ok_or_else(invalid)?,
    };

    Ok(success(quiz.start_session(tags, count).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerBody {
    session_id: Option<String>,
    question_index: Option<i64>,
    selected_option: Option<i64>,
}

pub async fn submit_answer(
    State(quiz): State<QuizService>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<AnswerOutcome> {
    let missing = || {
        ApiError::bad_request(
            "MISSING_FIELDS",
            "Session ID, question index, and selected option are required",
        )
    };
    let body: AnswerBody = serde_json::from_value(body).map_err(|_| missing())?;
    let (Some(session_id), Some(question_index), Some(selected_option)) = (
        body.session_id.filter(|s| !s.is_empty()),
        body.question_index,
        body.selected_option,
    ) else {
        return Err(missing());
    };

    let outcome = quiz
        .submit_answer(&session_id, question_index, selected_option)
        .await?;
    Ok(success(outcome))
}

pub async fn next_question(
    State(quiz): State<QuizService>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Navigation> {
    let id = session_id(&body)?;
    Ok(success(quiz.next(&id).await?))
}

pub async fn prev_question(
    State(quiz): State<QuizService>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Navigation> {
    let id = session_id(&body)?;
    Ok(success(quiz.prev(&id).await?))
}

pub async fn get_session(
    State(quiz): State<QuizService>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    Ok(success(quiz.get_session(&session_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_list() {
        assert_eq!(string_list(None), Some(Vec::new()));
        assert_eq!(
            string_list(Some(&json!(["a", "b"]))),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(string_list(Some(&json!("a"))), None);
        assert_eq!(string_list(Some(&json!(["a", 1]))), None);
    }

    #[test]
    fn test_session_id_required() {
        assert!(session_id(&json!({})).is_err());
        assert!(session_id(&json!({"sessionId": ""})).is_err());
        assert_eq!(session_id(&json!({"sessionId": "abc"})).unwrap(), "abc");
    }

    #[test]
    fn test_quiz_error_mapping() {
        use axum::http::StatusCode;
        assert_eq!(ApiError::from(QuizError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(QuizError::InvalidQuestionIndex).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
