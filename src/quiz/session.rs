use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::QuizSessionRow;
use crate::questions::Question;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("Quiz session not found")]
    NotFound,
    #[error("Invalid question index")]
    InvalidQuestionIndex,
    #[error("Quiz session has no questions")]
    Empty,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: u32,
    pub selected_option: i64,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer: usize,
    pub explanation: String,
    pub selected_option: i64,
}

/// A quiz in progress: a fixed question list, a cursor that always points
/// at a question, and answers keyed by question position.
#[derive(Debug, Clone)]
pub struct QuizState {
    pub id: String,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: Vec<Option<AnswerRecord>>,
    pub tags: Vec<String>,
    pub file_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl QuizState {
    pub fn new(
        id: String,
        questions: Vec<Question>,
        tags: Vec<String>,
        file_ids: Vec<String>,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::Empty);
        }
        Ok(Self {
            id,
            questions,
            current_index: 0,
            answers: Vec::new(),
            tags,
            file_ids,
            created_at: Utc::now(),
        })
    }

    pub fn from_row(row: QuizSessionRow) -> Result<Self, QuizError> {
        let questions: Vec<Question> =
            serde_json::from_str(&row.questions_json).map_err(anyhow::Error::from)?;
        if questions.is_empty() {
            return Err(QuizError::Empty);
        }
        let current_index = (row.current_index.max(0) as usize).min(questions.len() - 1);

        Ok(Self {
            id: row.id,
            current_index,
            answers: serde_json::from_str(&row.answers).unwrap_or_default(),
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            file_ids: serde_json::from_str(&row.file_ids).unwrap_or_default(),
            created_at: row.created_at,
            questions,
        })
    }

    pub fn to_row(&self) -> Result<QuizSessionRow, QuizError> {
        Ok(QuizSessionRow {
            id: self.id.clone(),
            file_ids: encode(&self.file_ids)?,
            tags: encode(&self.tags)?,
            questions_json: encode(&self.questions)?,
            current_index: self.current_index as i64,
            answers: encode(&self.answers)?,
            created_at: self.created_at,
            updated_at: Utc::now(),
        })
    }

    pub fn answers_json(&self) -> Result<String, QuizError> {
        encode(&self.answers)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current_index]
    }

    pub fn is_first(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.current_index == self.questions.len() - 1
    }

    /// Advances the cursor, stopping on the last question.
    pub fn next(&mut self) -> usize {
        self.current_index = (self.current_index + 1).min(self.questions.len() - 1);
        self.current_index
    }

    /// Moves the cursor back, stopping on the first question.
    pub fn prev(&mut self) -> usize {
        self.current_index = self.current_index.saturating_sub(1);
        self.current_index
    }

    /// Records an answer for the question at `index`, replacing any earlier
    /// answer to it. The cursor does not move.
    pub fn submit_answer(&mut self, index: i64, selected_option: i64) -> Result<AnswerOutcome, QuizError> {
        let idx = usize::try_from(index)
            .ok()
            .filter(|&i| i < self.questions.len())
            .ok_or(QuizError::InvalidQuestionIndex)?;
        let question = &self.questions[idx];
        let is_correct = usize::try_from(selected_option)
            .map(|s| question.is_correct(s))
            .unwrap_or(false);

        let outcome = AnswerOutcome {
            is_correct,
            correct_answer: question.correct_answer,
            explanation: question.explanation.clone(),
            selected_option,
        };
        let record = AnswerRecord {
            question_id: question.id,
            selected_option,
            is_correct,
            answered_at: Utc::now(),
        };

        if self.answers.len() <= idx {
            self.answers.resize(idx + 1, None);
        }
        self.answers[idx] = Some(record);
        Ok(outcome)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, QuizError> {
    serde_json::to_string(value).map_err(|e| QuizError::Storage(e.into()))
}
