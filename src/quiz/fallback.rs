//! Static question banks used when remote generation is unavailable.

use anyhow::{Context, Result, bail};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::path::Path;

use crate::questions::{Difficulty, Question, renumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    Generated,
    Fallback,
    Generic,
}

/// Picks a bank file by keyword. The first matching topic wins.
pub fn bank_file_for(tags: &[String]) -> &'static str {
    let text = tags.join(" ").to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if has(&["javascript", "js", "typescript", "ts", "react", "node"]) {
        "javascript.json"
    } else if has(&["python", "py", "django"]) {
        "python.json"
    } else if has(&["sql", "database", "databases", "db"]) {
        "databases.json"
    } else if has(&["algorithm", "algorithms"]) || text.contains("data structure") {
        "algorithms.json"
    } else {
        "general.json"
    }
}

pub async fn load_bank(path: &Path) -> Result<Vec<Question>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read question bank {}", path.display()))?;
    let questions: Vec<Question> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid question bank {}", path.display()))?;
    if questions.is_empty() {
        bail!("Question bank {} is empty", path.display());
    }
    Ok(questions)
}

/// Questions for when the topic bank is missing too. Cycled to `count`.
pub fn generic_questions(count: usize) -> Vec<Question> {
    let base = [
        (
            "Which study technique involves explaining a concept in simple terms as if teaching it?",
            ["Spaced repetition", "The Feynman technique", "Interleaving", "Mind mapping"],
            1,
            "The Feynman technique asks you to explain an idea simply to expose gaps in understanding.",
        ),
        (
            "What is the main benefit of spaced repetition?",
            [
                "It shortens each study session",
                "It improves long-term retention",
                "It removes the need for notes",
                "It replaces practice problems",
            ],
            1,
            "Reviewing material at increasing intervals strengthens long-term memory.",
        ),
        (
            "Which activity best tests whether you have learned something?",
            [
                "Re-reading the chapter",
                "Highlighting key passages",
                "Retrieving the answer from memory",
                "Copying notes neatly",
            ],
            2,
            "Active recall practice is a stronger signal of learning than passive review.",
        ),
        (
            "What does interleaving mean when studying?",
            [
                "Mixing different topics or problem types in one session",
                "Studying only one topic per day",
                "Taking a break every ten minutes",
                "Reading two books at once",
            ],
            0,
            "Interleaving mixes related skills so you practice choosing the right approach.",
        ),
        (
            "Why is sleep important for learning?",
            [
                "It has no effect on memory",
                "It only matters before exams",
                "It helps consolidate new memories",
                "It replaces the need for review",
            ],
            2,
            "Memory consolidation happens largely during sleep.",
        ),
    ];

    let mut questions: Vec<Question> = (0..count)
        .map(|i| {
            let (question, options, correct_answer, explanation) = &base[i % base.len()];
            Question {
                id: 0,
                question: question.to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
                correct_answer: *correct_answer,
                explanation: explanation.to_string(),
                difficulty: Some(Difficulty::Easy),
                tags: vec!["general".to_string()],
                source: Some("Built-in study questions".to_string()),
            }
        })
        .collect();
    renumber(&mut questions);
    questions
}

/// Shuffled questions from the matching bank under `dir`, or the generic set
/// if that bank cannot be used. Never empty for `count > 0`.
pub async fn fallback_questions(
    dir: &Path,
    tags: &[String],
    count: usize,
) -> (Vec<Question>, QuestionSource) {
    let path = dir.join(bank_file_for(tags));
    match load_bank(&path).await {
        Ok(mut questions) => {
            questions.shuffle(&mut rand::thread_rng());
            questions.truncate(count);
            renumber(&mut questions);
            tracing::info!(
                "Serving {} fallback questions from {}",
                questions.len(),
                path.display()
            );
            (questions, QuestionSource::Fallback)
        }
        Err(e) => {
            tracing::warn!("Fallback bank unavailable, using generic questions: {:#}", e);
            (generic_questions(count), QuestionSource::Generic)
        }
    }
}
