use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::db::models::{GenerationStatus, QuestionSetRow};
use crate::db::queries;
use crate::questions::Question;

pub const DUPLICATE_THRESHOLD: f64 = 0.8;
const HISTORY_WINDOW: i64 = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSet {
    pub session_id: String,
    pub questions: Vec<Question>,
    pub tags: Vec<String>,
    pub source_chunks: Vec<String>,
    pub status: GenerationStatus,
    pub question_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QuestionSetRow> for QuestionSet {
    type Error = anyhow::Error;

    fn try_from(row: QuestionSetRow) -> Result<Self> {
        Ok(Self {
            questions: serde_json::from_str(&row.questions)
                .with_context(|| format!("Corrupt questions for session {}", row.session_id))?,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            source_chunks: serde_json::from_str(&row.source_chunks).unwrap_or_default(),
            status: row.status.parse()?,
            question_count: row.question_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            session_id: row.session_id,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetStats {
    pub total_sets: i64,
    pub ready_sets: i64,
    pub generating_sets: i64,
    pub failed_sets: i64,
    pub total_questions: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DedupeOutcome {
    pub kept: Vec<Question>,
    pub duplicates: Vec<Question>,
}

/// Generated question sets, keyed by quiz session.
#[derive(Clone)]
pub struct QuestionHistory {
    pool: SqlitePool,
}

impl QuestionHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores the set and marks it ready, replacing any earlier row.
    pub async fn save_set(
        &self,
        session_id: &str,
        questions: &[Question],
        tags: &[String],
        source_chunks: &[String],
    ) -> Result<()> {
        queries::save_question_set(
            &self.pool,
            session_id,
            &serde_json::to_string(questions)?,
            &serde_json::to_string(source_chunks)?,
            &serde_json::to_string(tags)?,
            questions.len() as i64,
        )
        .await
        .context("Failed to save question set")?;

        tracing::info!(
            "Saved question set for session {} with {} questions",
            session_id,
            questions.len()
        );
        Ok(())
    }

    pub async fn get_set(&self, session_id: &str) -> Result<Option<QuestionSet>> {
        queries::get_question_set(&self.pool, session_id)
            .await?
            .map(QuestionSet::try_from)
            .transpose()
    }

    pub async fn update_status(&self, session_id: &str, status: GenerationStatus) -> Result<()> {
        queries::upsert_question_set_status(&self.pool, session_id, status).await
    }

    /// Questions from the newest ready sets whose tags mention the first tag.
    pub async fn recent_by_tags(&self, tags: &[String], limit: i64) -> Result<Vec<Question>> {
        let tag = tags.first().map(String::as_str).unwrap_or("");
        let rows = queries::recent_ready_sets_containing(&self.pool, tag, limit).await?;

        let mut questions = Vec::new();
        for row in rows {
            match serde_json::from_str::<Vec<Question>>(&row.questions) {
                Ok(qs) => questions.extend(qs),
                Err(e) => tracing::warn!("Skipping unreadable set {}: {}", row.session_id, e),
            }
        }
        Ok(questions)
    }

    /// Splits `new` into questions unlike anything recently generated for
    /// these tags and near-duplicates. If history cannot be read, everything
    /// is kept.
    pub async fn avoid_duplicates(
        &self,
        new: Vec<Question>,
        tags: &[String],
        threshold: f64,
    ) -> DedupeOutcome {
        let history = match self.recent_by_tags(tags, HISTORY_WINDOW).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!("Failed to filter duplicate questions: {}", e);
                return DedupeOutcome {
                    kept: new,
                    duplicates: Vec::new(),
                };
            }
        };

        let outcome = partition_duplicates(new, &history, threshold);
        tracing::info!("Filtered {} duplicate questions", outcome.duplicates.len());
        outcome
    }

    pub async fn stats(&self) -> Result<QuestionSetStats> {
        let counts = queries::question_set_counts(&self.pool).await?;
        Ok(QuestionSetStats {
            total_sets: counts.total_sets,
            ready_sets: counts.ready_sets,
            generating_sets: counts.generating_sets,
            failed_sets: counts.failed_sets,
            total_questions: counts.total_questions,
        })
    }
}

/// Jaccard index of the lower-cased word sets of `a` and `b`.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 1.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

pub fn partition_duplicates(new: Vec<Question>, history: &[Question], threshold: f64) -> DedupeOutcome {
    let mut outcome = DedupeOutcome::default();
    for question in new {
        let duplicate = history
            .iter()
            .any(|old| jaccard_similarity(&question.question, &old.question) > threshold);
        if duplicate {
            tracing::debug!("Skipping duplicate question: {}", question.question);
            outcome.duplicates.push(question);
        } else {
            outcome.kept.push(question);
        }
    }
    outcome
}

/// Caps the kept questions at `count`, topping up from the duplicates when
/// filtering left too few.
pub fn fill_to_count(outcome: DedupeOutcome, count: usize) -> Vec<Question> {
    let DedupeOutcome { mut kept, duplicates } = outcome;
    if kept.len() >= count {
        kept.truncate(count);
        return kept;
    }
    let missing = count - kept.len();
    kept.extend(duplicates.into_iter().take(missing));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    fn question(text: &str) -> Question {
        Question {
            id: 0,
            question: text.to_string(),
            options: vec!["a".into(), "b".into()],
            correct_answer: 0,
            explanation: String::new(),
            difficulty: None,
            tags: Vec::new(),
            source: None,
        }
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity("What is SQL", "what is sql"), 1.0);
        assert_eq!(jaccard_similarity("", ""), 1.0);
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
        // {a,b,c,d} vs {a,b,c,e}: 3 shared of 5
        assert!((jaccard_similarity("a b c d", "a b c e") - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        // 4 shared of 5 words is exactly 0.8 and is kept.
        let history = vec![question("one two three four five")];
        let outcome = partition_duplicates(
            vec![question("one two three four"), question("one two three four five")],
            &history,
            DUPLICATE_THRESHOLD,
        );
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].question, "one two three four");
        assert_eq!(outcome.duplicates.len(), 1);
    }

    #[test]
    fn test_fill_to_count() {
        let outcome = DedupeOutcome {
            kept: vec![question("k1")],
            duplicates: vec![question("d1"), question("d2")],
        };
        let filled = fill_to_count(outcome.clone(), 2);
        let texts: Vec<_> = filled.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(texts, vec!["k1", "d1"]);

        assert_eq!(fill_to_count(outcome.clone(), 10).len(), 3);
        assert_eq!(fill_to_count(outcome, 0).len(), 0);
    }

    #[tokio::test]
    async fn test_history_round_trip_and_dedupe() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let history = QuestionHistory::new(pool);
        let tags = vec!["sql".to_string()];

        history.update_status("s1", GenerationStatus::Generating).await.unwrap();
        assert_eq!(
            history.get_set("s1").await.unwrap().unwrap().status,
            GenerationStatus::Generating
        );

        history
            .save_set("s1", &[question("What does a LEFT JOIN return")], &tags, &["c1".to_string()])
            .await
            .unwrap();
        let set = history.get_set("s1").await.unwrap().unwrap();
        assert_eq!(set.status, GenerationStatus::Ready);
        assert_eq!(set.source_chunks, vec!["c1"]);
        assert_eq!(set.question_count, 1);

        let outcome = history
            .avoid_duplicates(
                vec![question("what does a left join return"), question("Define normalization")],
                &tags,
                DUPLICATE_THRESHOLD,
            )
            .await;
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].question, "Define normalization");

        let stats = history.stats().await.unwrap();
        assert_eq!(stats.ready_sets, 1);
        assert_eq!(stats.total_questions, 1);
        assert!(history.get_set("missing").await.unwrap().is_none());
    }
}
