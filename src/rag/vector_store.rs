use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::processing::ChunkMetadata;

/// Flat scalar metadata, as vector databases store it.
pub type Metadata = Map<String, Value>;

const TAG_KEY_PREFIX: &str = "tag:";
const SNAPSHOT_FILE: &str = "vectors.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine distance, `1 - similarity`.
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<()>;

    /// Nearest documents first. A non-empty `tag_filter` keeps documents
    /// carrying any of the tags.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        n_results: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<SearchHit>>;

    async fn delete_document(&self, id: &str) -> Result<()>;

    async fn count(&self) -> usize;

    async fn health_check(&self) -> bool;
}

/// Flattens chunk metadata. Tags become a JSON string plus one boolean
/// `tag:<name>` key per tag so that filters can test membership.
pub fn chunk_metadata(meta: &ChunkMetadata) -> Metadata {
    let mut map = match serde_json::to_value(meta) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.retain(|_, v| !v.is_null());
    map.insert(
        "tags".to_string(),
        Value::String(serde_json::to_string(&meta.tags).unwrap_or_else(|_| "[]".to_string())),
    );
    for tag in &meta.tags {
        map.insert(tag_key(tag), Value::Bool(true));
    }
    map
}

pub fn tag_key(tag: &str) -> String {
    format!("{}{}", TAG_KEY_PREFIX, tag)
}

pub fn tags_from_metadata(metadata: &Metadata) -> Vec<String> {
    metadata
        .get("tags")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn matches_tags(metadata: &Metadata, tags: &[String]) -> bool {
    tags.iter()
        .any(|t| metadata.get(&tag_key(t)).and_then(Value::as_bool) == Some(true))
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// In-process brute-force store, optionally persisted as a JSON snapshot.
pub struct LocalVectorStore {
    documents: RwLock<Vec<VectorDocument>>,
    snapshot_path: Option<PathBuf>,
}

impl LocalVectorStore {
    pub fn in_memory() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            snapshot_path: None,
        }
    }

    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create vector directory {}", dir.display()))?;
        let path = dir.join(SNAPSHOT_FILE);

        let documents = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw).context("Corrupt vector snapshot")?
        } else {
            Vec::new()
        };

        tracing::info!(
            "Opened local vector store at {} ({} documents)",
            path.display(),
            documents.len()
        );

        Ok(Self {
            documents: RwLock::new(documents),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let raw = {
            let docs = self
                .documents
                .read()
                .map_err(|_| anyhow::anyhow!("Vector store lock poisoned"))?;
            serde_json::to_string(&*docs)?
        };
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<()> {
        let added = documents.len();
        {
            let mut docs = self
                .documents
                .write()
                .map_err(|_| anyhow::anyhow!("Vector store lock poisoned"))?;
            for doc in documents {
                match docs.iter_mut().find(|d| d.id == doc.id) {
                    Some(existing) => *existing = doc,
                    None => docs.push(doc),
                }
            }
        }
        self.persist().await?;
        tracing::info!("Added {} documents to local vector store", added);
        Ok(())
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        n_results: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let docs = self
            .documents
            .read()
            .map_err(|_| anyhow::anyhow!("Vector store lock poisoned"))?;

        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|d| match tag_filter {
                Some(tags) if !tags.is_empty() => matches_tags(&d.metadata, tags),
                _ => true,
            })
            .map(|d| SearchHit {
                id: d.id.clone(),
                content: d.content.clone(),
                metadata: d.metadata.clone(),
                distance: 1.0 - cosine_similarity(query_embedding, &d.embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        {
            let mut docs = self
                .documents
                .write()
                .map_err(|_| anyhow::anyhow!("Vector store lock poisoned"))?;
            docs.retain(|d| d.id != id);
        }
        self.persist().await
    }

    async fn count(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    async fn health_check(&self) -> bool {
        self.documents.read().is_ok()
    }
}
