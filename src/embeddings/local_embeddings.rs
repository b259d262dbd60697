use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{EmbeddingProvider, EmbeddingResult, estimate_tokens};
use crate::request_counter::RequestCounter;

/// Offline embeddings with FastEmbed (all-MiniLM-L6-v2, 384 dimensions).
/// The model is downloaded on first use and cached locally.
pub struct LocalEmbeddingService {
    model: Arc<Mutex<TextEmbedding>>,
    counter: RequestCounter,
}

impl LocalEmbeddingService {
    pub fn new(counter: RequestCounter) -> Result<Self> {
        tracing::info!("Initializing local embedding model (all-MiniLM-L6-v2)...");

        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
        )
        .context("Failed to initialize local embedding model")?;

        tracing::info!("Local embedding model loaded successfully");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            counter,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingService {
    fn model_name(&self) -> &str {
        "all-MiniLM-L6-v2 (local)"
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
        self.counter.log_embedding_request("local");
        let model = self.model.lock().await;

        let mut embeddings = model
            .embed(vec![text.to_string()], None)
            .context("Failed to generate embedding")?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))?;

        Ok(EmbeddingResult {
            embedding,
            tokens: estimate_tokens(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "downloads the embedding model"]
    async fn test_embed_text() {
        let service = LocalEmbeddingService::new(RequestCounter::new()).unwrap();
        let result = service.embed("Hello world").await.unwrap();
        assert_eq!(result.embedding.len(), 384);
    }
}
