//! Chroma REST (v1) backed vector store.
//!
//! The collection is resolved on first use and cached. While Chroma is
//! unreachable the store degrades instead of failing: adds are skipped,
//! searches come back empty and the count is zero.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::RwLock;

use super::vector_store::{Metadata, SearchHit, VectorDocument, VectorStore, tag_key};

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct AddRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a Metadata>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    where_filter: Option<Value>,
    include: [&'static str; 3],
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        let Some(ids) = self.ids.into_iter().next() else {
            return Vec::new();
        };
        let mut documents = self.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let mut metadatas = self.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let mut distances = self.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();
        documents.resize(ids.len(), None);
        metadatas.resize(ids.len(), None);
        distances.resize(ids.len(), None);

        ids.into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, content), metadata), distance)| SearchHit {
                id,
                content: content.unwrap_or_default(),
                metadata: metadata.unwrap_or_default(),
                distance: distance.unwrap_or(0.0),
            })
            .collect()
    }
}

/// `where` clause matching any of `tags`. Chroma's `$or` needs two or more
/// operands, so a single tag is a bare equality.
pub fn tag_filter(tags: &[String]) -> Option<Value> {
    let mut clauses: Vec<Value> = tags
        .iter()
        .map(|t| json!({ tag_key(t): { "$eq": true } }))
        .collect();
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(json!({ "$or": clauses })),
    }
}

pub struct ChromaStore {
    http: reqwest::Client,
    base_url: String,
    collection_name: String,
    collection_id: RwLock<Option<String>>,
}

impl ChromaStore {
    pub fn new(base_url: &str, collection_name: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: format!("{}/api/v1", base_url.trim_end_matches('/')),
            collection_name: collection_name.to_string(),
            collection_id: RwLock::new(None),
        })
    }

    async fn collection(&self) -> Result<String> {
        if let Some(id) = self.collection_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let mut slot = self.collection_id.write().await;
        if let Some(id) = slot.as_ref() {
            return Ok(id.clone());
        }

        self.http
            .get(format!("{}/heartbeat", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("ChromaDB unavailable")?;

        let created: CollectionResponse = self
            .http
            .post(format!("{}/collections", self.base_url))
            .json(&json!({
                "name": self.collection_name,
                "metadata": { "hnsw:space": "cosine" },
                "get_or_create": true,
            }))
            .send()
            .await?
            .error_for_status()
            .context("Failed to get or create Chroma collection")?
            .json()
            .await?;

        tracing::info!(
            "Connected to Chroma collection: {} ({})",
            self.collection_name,
            created.id
        );
        *slot = Some(created.id.clone());
        Ok(created.id)
    }

    fn collection_url(&self, id: &str, op: &str) -> String {
        format!("{}/collections/{}/{}", self.base_url, id, op)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn backend_name(&self) -> &'static str {
        "chroma"
    }

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<()> {
        let id = match self.collection().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("ChromaDB not available, skipping document addition: {:#}", e);
                return Ok(());
            }
        };

        let body = AddRequest {
            ids: documents.iter().map(|d| d.id.as_str()).collect(),
            embeddings: documents.iter().map(|d| d.embedding.as_slice()).collect(),
            documents: documents.iter().map(|d| d.content.as_str()).collect(),
            metadatas: documents.iter().map(|d| &d.metadata).collect(),
        };

        let res = self
            .http
            .post(self.collection_url(&id, "add"))
            .json(&body)
            .send()
            .await
            .context("Error adding documents to ChromaDB")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("Chroma add failed {}: {}", status, text));
        }

        tracing::info!("Added {} documents to Chroma collection", documents.len());
        Ok(())
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        n_results: usize,
        tags: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let id = match self.collection().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("ChromaDB not available, returning empty search results: {:#}", e);
                return Ok(Vec::new());
            }
        };

        let body = QueryRequest {
            query_embeddings: [query_embedding],
            n_results,
            where_filter: tags.and_then(tag_filter),
            include: ["documents", "metadatas", "distances"],
        };

        let result = async {
            self.http
                .post(self.collection_url(&id, "query"))
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json::<QueryResponse>()
                .await
        }
        .await;

        match result {
            Ok(response) => Ok(response.into_hits()),
            Err(e) => {
                tracing::error!("Error searching ChromaDB: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        let id = match self.collection().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("ChromaDB not available, skipping document deletion: {:#}", e);
                return Ok(());
            }
        };

        self.http
            .post(self.collection_url(&id, "delete"))
            .json(&json!({ "ids": [doc_id] }))
            .send()
            .await?
            .error_for_status()
            .context("Error deleting document from ChromaDB")?;
        Ok(())
    }

    async fn count(&self) -> usize {
        let Ok(id) = self.collection().await else {
            return 0;
        };

        let result = async {
            self.http
                .get(self.collection_url(&id, "count"))
                .send()
                .await?
                .error_for_status()?
                .json::<usize>()
                .await
        }
        .await;

        result.unwrap_or_else(|e| {
            tracing::error!("Error getting collection count: {}", e);
            0
        })
    }

    async fn health_check(&self) -> bool {
        let Ok(id) = self.collection().await else {
            return false;
        };
        self.http
            .get(self.collection_url(&id, "count"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Path, routing::{get, post}};

    async fn spawn_fake_chroma() -> String {
        let app = Router::new()
            .route("/api/v1/heartbeat", get(|| async { Json(json!({"nanosecond heartbeat": 1})) }))
            .route(
                "/api/v1/collections",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["metadata"]["hnsw:space"], "cosine");
                    Json(json!({"id": "col-1", "name": body["name"]}))
                }),
            )
            .route(
                "/api/v1/collections/{id}/query",
                post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                    assert_eq!(id, "col-1");
                    assert_eq!(body["where"], json!({"tag:sql": {"$eq": true}}));
                    Json(json!({
                        "ids": [["c1", "c2"]],
                        "documents": [["first", null]],
                        "metadatas": [[{"fileId": "f1"}, null]],
                        "distances": [[0.25, 0.5]]
                    }))
                }),
            )
            .route("/api/v1/collections/{id}/count", get(|| async { Json(7) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_tag_filter_shapes() {
        assert_eq!(tag_filter(&[]), None);
        assert_eq!(
            tag_filter(&["a".to_string()]),
            Some(json!({"tag:a": {"$eq": true}}))
        );
        assert_eq!(
            tag_filter(&["a".to_string(), "b".to_string()]),
            Some(json!({"$or": [{"tag:a": {"$eq": true}}, {"tag:b": {"$eq": true}}]}))
        );
    }

    #[tokio::test]
    async fn test_query_against_fake_chroma() {
        let url = spawn_fake_chroma().await;
        let store = ChromaStore::new(&url, "study_documents").unwrap();

        let tags = vec!["sql".to_string()];
        let hits = store.search_similar(&[0.1, 0.2], 5, Some(&tags)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "first");
        assert_eq!(hits[0].metadata["fileId"], "f1");
        assert_eq!(hits[1].content, "");
        assert_eq!(hits[1].distance, 0.5);

        assert_eq!(store.count().await, 7);
        assert!(store.health_check().await);
    }

    #[tokio::test]
    async fn test_unreachable_chroma_degrades() {
        let store = ChromaStore::new("http://127.0.0.1:9", "study_documents").unwrap();
        assert!(store.search_similar(&[1.0], 3, None).await.unwrap().is_empty());
        assert!(store.add_documents(Vec::new()).await.is_ok());
        assert_eq!(store.count().await, 0);
        assert!(!store.health_check().await);
    }
}
