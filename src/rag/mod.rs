pub mod chroma;
pub mod search;
pub mod vector_store;

use anyhow::{Result, bail};
use std::sync::Arc;

use crate::config::VectorStoreConfig;

pub use chroma::ChromaStore;
pub use search::{ContextResult, VectorSearchProvider};
pub use vector_store::{LocalVectorStore, SearchHit, VectorDocument, VectorStore};

pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "chroma" => Ok(Arc::new(ChromaStore::new(
            &config.chroma_url,
            &config.collection_name,
        )?)),
        "local" => Ok(Arc::new(LocalVectorStore::open(&config.persist_dir)?)),
        other => bail!("Unknown VECTOR_STORE backend: {}", other),
    }
}
