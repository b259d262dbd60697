use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use super::vector_store::{Metadata, SearchHit, VectorStore};
use crate::embeddings::{EmbeddingProvider, embed_query};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResult {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub relevance_score: f32,
}

impl From<SearchHit> for ContextResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            content: hit.content,
            metadata: hit.metadata,
            relevance_score: 1.0 - hit.distance,
        }
    }
}

/// Query text for a tag-only document search.
pub fn topics_query(tags: &[String]) -> String {
    format!("Topics: {}", tags.join(", "))
}

/// Query text used when context retrieval only has tags.
pub fn tag_query(tags: &[String]) -> String {
    format!(
        "Topics: {}. Educational content about {}.",
        tags.join(", "),
        tags.join(" and ")
    )
}

/// Embeds queries and runs them against the vector store.
#[derive(Clone)]
pub struct VectorSearchProvider {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorSearchProvider {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    pub async fn relevant_contexts(
        &self,
        tags: &[String],
        max_contexts: usize,
        semantic_query: Option<&str>,
    ) -> Result<Vec<ContextResult>> {
        let query = match semantic_query {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => tag_query(tags),
        };
        self.search_by_text(&query, max_contexts, Some(tags)).await
    }

    pub async fn search_by_text(
        &self,
        query: &str,
        max_results: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<ContextResult>> {
        let embedding = embed_query(self.embedder.as_ref(), query).await?;
        let hits = self
            .store
            .search_similar(&embedding, max_results, tag_filter)
            .await?;
        Ok(hits.into_iter().map(ContextResult::from).collect())
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await && self.embedder.health_check().await
    }
}
