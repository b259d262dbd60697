pub mod history;
pub mod mixtral;

use anyhow::Result;
use async_trait::async_trait;

use crate::questions::{Difficulty, Question};

pub use history::QuestionHistory;
pub use mixtral::MixtralGenerator;

#[derive(Debug, Clone)]
pub struct QuestionGenerationRequest {
    pub contexts: Vec<String>,
    pub tags: Vec<String>,
    pub question_count: usize,
    pub difficulty: Difficulty,
}

/// An LLM backend that turns retrieved contexts into questions.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &QuestionGenerationRequest) -> Result<Vec<Question>>;

    fn is_configured(&self) -> bool;

    async fn test_connection(&self) -> bool;
}
