use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counts outbound embedding and generation API calls.
#[derive(Clone)]
pub struct RequestCounter {
    embedding_count: Arc<AtomicU64>,
    generation_count: Arc<AtomicU64>,
    start_time: Instant,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub embedding_requests: u64,
    pub generation_requests: u64,
    pub elapsed_secs: u64,
    pub requests_per_minute: f64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self {
            embedding_count: Arc::new(AtomicU64::new(0)),
            generation_count: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn log_embedding_request(&self, context: &str) -> u64 {
        let count = self.embedding_count.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::debug!(
            request = self.total_requests(),
            kind = "embedding",
            context,
            embeddings = count,
            "Outbound API request"
        );

        count
    }

    pub fn log_generation_request(&self, context: &str) -> u64 {
        let count = self.generation_count.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            request = self.total_requests(),
            kind = "generation",
            context,
            generations = count,
            rate_per_min = format!("{:.2}", self.request_rate()),
            "Outbound API request"
        );

        count
    }

    pub fn embedding_count(&self) -> u64 {
        self.embedding_count.load(Ordering::SeqCst)
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> u64 {
        self.embedding_count() + self.generation_count()
    }

    fn request_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return 0.0;
        }
        (self.total_requests() as f64 / elapsed) * 60.0
    }

    pub fn snapshot(&self) -> RequestStats {
        RequestStats {
            embedding_requests: self.embedding_count(),
            generation_requests: self.generation_count(),
            elapsed_secs: self.start_time.elapsed().as_secs(),
            requests_per_minute: self.request_rate(),
        }
    }

    pub fn print_summary(&self) {
        let stats = self.snapshot();
        tracing::info!(
            "API request summary | Total: {} | Embeddings: {} | Generations: {} | Elapsed: {}s | Avg Rate: {:.2} req/min",
            self.total_requests(),
            stats.embedding_requests,
            stats.generation_requests,
            stats.elapsed_secs,
            stats.requests_per_minute
        );
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}
