pub mod huggingface;
#[cfg(feature = "local-embeddings")]
pub mod local_embeddings;

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::request_counter::RequestCounter;

pub use huggingface::HuggingFaceEmbeddings;
#[cfg(feature = "local-embeddings")]
pub use local_embeddings::LocalEmbeddingService;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
    pub tokens: usize,
}

/// A single-text embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<EmbeddingResult>;

    async fn health_check(&self) -> bool {
        match self.embed("health check").await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Embedding health check failed: {}", e);
                false
            }
        }
    }
}

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Embeds every text concurrently. Fails if any single call fails.
pub async fn embed_batch(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<EmbeddingResult>> {
    tracing::debug!("Generating embeddings for {} texts", texts.len());
    try_join_all(texts.iter().map(|text| provider.embed(text))).await
}

pub async fn embed_query(provider: &dyn EmbeddingProvider, query: &str) -> Result<Vec<f32>> {
    Ok(provider.embed(query).await?.embedding)
}

/// Provider used when no backend is configured. Every call fails.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _text: &str) -> Result<EmbeddingResult> {
        bail!("Embedding provider is disabled")
    }
}

pub fn create_provider(
    config: &EmbeddingConfig,
    counter: RequestCounter,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "huggingface" => match &config.api_key {
            Some(key) => Ok(Arc::new(HuggingFaceEmbeddings::new(
                key.clone(),
                &config.api_url,
                &config.model,
                counter,
            )?)),
            None => {
                tracing::warn!("HUGGINGFACE_API_KEY not set, embeddings disabled");
                Ok(Arc::new(DisabledProvider))
            }
        },
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbeddingService::new(counter)?)),
        "disabled" => Ok(Arc::new(DisabledProvider)),
        other => bail!("Unknown EMBEDDING_PROVIDER: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }

        async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
            if text == "boom" {
                bail!("provider exploded");
            }
            Ok(EmbeddingResult {
                embedding: vec![text.len() as f32, 1.0],
                tokens: estimate_tokens(text),
            })
        }
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let texts = vec!["a".to_string(), "abc".to_string()];
        let results = embed_batch(&LengthEmbedder, &texts).await.unwrap();
        assert_eq!(results[0].embedding[0], 1.0);
        assert_eq!(results[1].embedding[0], 3.0);
    }

    #[tokio::test]
    async fn test_batch_fails_if_any_fails() {
        let texts = vec!["ok".to_string(), "boom".to_string()];
        assert!(embed_batch(&LengthEmbedder, &texts).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_is_unhealthy() {
        assert!(!DisabledProvider.health_check().await);
        assert!(LengthEmbedder.health_check().await);
    }

    #[test]
    fn test_missing_key_disables_huggingface() {
        let config = EmbeddingConfig {
            provider: "huggingface".to_string(),
            api_key: None,
            api_url: "http://localhost".to_string(),
            model: "m".to_string(),
        };
        let provider = create_provider(&config, RequestCounter::new()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
    }
}
