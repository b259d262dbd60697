use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn bind_addr(default_port: u16) -> String {
    let host = env_or("HOST", "127.0.0.1");
    let port = env_parse("PORT", default_port);
    format!("{}:{}", host, port)
}

fn jwt_secret() -> Result<String> {
    env_opt("JWT_SECRET").context("JWT_SECRET not set")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap_size: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size),
            overlap_size: env_parse("CHUNK_OVERLAP", defaults.overlap_size),
        };
        if config.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// `huggingface`, `local` or `disabled`.
    pub provider: String,
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            provider: env_or("EMBEDDING_PROVIDER", "huggingface").to_lowercase(),
            api_key: env_opt("HUGGINGFACE_API_KEY"),
            api_url: env_or("HUGGINGFACE_API_URL", "https://api-inference.huggingface.co"),
            model: env_or("EMBEDDING_MODEL", "sentence-transformers/all-MiniLM-L6-v2"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// `chroma` or `local`.
    pub backend: String,
    pub chroma_url: String,
    pub collection_name: String,
    pub persist_dir: PathBuf,
}

impl VectorStoreConfig {
    pub fn from_env() -> Self {
        Self {
            backend: env_or("VECTOR_STORE", "chroma").to_lowercase(),
            chroma_url: env_or("CHROMA_URL", "http://localhost:8000"),
            collection_name: env_or("CHROMA_COLLECTION_NAME", "study_documents"),
            persist_dir: PathBuf::from(env_or("CHROMA_PERSIST_DIRECTORY", "./chroma_data")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_opt("MIXTRAL_API_KEY"),
            api_url: env_opt("MIXTRAL_API_URL").map(|u| u.trim_end_matches('/').to_string()),
            model: env_or("MIXTRAL_MODEL", "mistralai/Mixtral-8x7B-Instruct-v0.1"),
            timeout: Duration::from_secs(env_parse("MIXTRAL_TIMEOUT_SECS", 60)),
        }
    }
}

/// Settings for the main backend (`server` binary).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub upload_dir: PathBuf,
    pub mcp_url: String,
    pub fallback_questions_dir: PathBuf,
    pub quiz_page_url: String,
    pub mcp_health_timeout: Duration,
    pub mcp_generate_timeout: Duration,
    pub reminders_enabled: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: bind_addr(3001),
            database_url: env_or("DATABASE_URL", "sqlite://data/study.db"),
            jwt_secret: jwt_secret()?,
            cors_origin: env_or("CLIENT_URL", "*"),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
            mcp_url: env_or("MCP_SERVER_URL", "http://localhost:3002")
                .trim_end_matches('/')
                .to_string(),
            fallback_questions_dir: PathBuf::from(env_or(
                "FALLBACK_QUESTIONS_DIR",
                "fixtures/questions",
            )),
            quiz_page_url: env_or("QUIZ_PAGE_URL", "http://localhost:5173/quiz"),
            mcp_health_timeout: Duration::from_secs(env_parse("MCP_HEALTH_TIMEOUT_SECS", 5)),
            mcp_generate_timeout: Duration::from_secs(env_parse("MCP_GENERATE_TIMEOUT_SECS", 120)),
            reminders_enabled: env_or("ENABLE_REMINDERS", "true").to_lowercase() == "true",
        })
    }
}

/// Settings for the document/question service (`mcp-server` binary).
#[derive(Debug, Clone)]
pub struct McpConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub generator: GeneratorConfig,
}

impl McpConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: bind_addr(3002),
            database_url: env_or("DATABASE_URL", "sqlite://data/study.db"),
            jwt_secret: jwt_secret()?,
            cors_origin: env_or("MAIN_BACKEND_URL", "http://localhost:3001"),
            chunking: ChunkingConfig::from_env()?,
            embedding: EmbeddingConfig::from_env(),
            vector_store: VectorStoreConfig::from_env(),
            generator: GeneratorConfig::from_env(),
        })
    }
}
