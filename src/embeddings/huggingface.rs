use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingProvider, EmbeddingResult, estimate_tokens};
use crate::request_counter::RequestCounter;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
}

/// The inference API returns either a flat vector or a batch of one.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl FeatureExtractionResponse {
    fn into_vector(self) -> Result<Vec<f32>> {
        match self {
            FeatureExtractionResponse::Flat(v) => Ok(v),
            FeatureExtractionResponse::Nested(mut rows) => {
                if rows.is_empty() {
                    bail!("Embedding response contained no vectors");
                }
                Ok(rows.swap_remove(0))
            }
        }
    }
}

/// HuggingFace feature-extraction client.
pub struct HuggingFaceEmbeddings {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    counter: RequestCounter,
    base_delay: Duration,
}

impl HuggingFaceEmbeddings {
    pub fn new(api_key: String, api_url: &str, model: &str, counter: RequestCounter) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!(
                "{}/pipeline/feature-extraction/{}",
                api_url.trim_end_matches('/'),
                model
            ),
            model: model.to_string(),
            counter,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        })
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, (Option<StatusCode>, anyhow::Error)> {
        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&FeatureExtractionRequest { inputs: text })
            .send()
            .await
            .map_err(|e| (None, anyhow!(e)))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| (Some(status), anyhow!(e)))?;
        if !status.is_success() {
            return Err((Some(status), anyhow!("HuggingFace error {}: {}", status, body)));
        }

        let parsed: FeatureExtractionResponse = serde_json::from_str(&body).map_err(|e| {
            (
                Some(status),
                anyhow!("Unexpected embedding response format: {}", e),
            )
        })?;
        parsed.into_vector().map_err(|e| (Some(status), e))
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
        tracing::debug!("Generating embedding for text of length: {}", text.len());

        for attempt in 0..MAX_ATTEMPTS {
            self.counter
                .log_embedding_request(&format!("{} chars, attempt {}", text.len(), attempt + 1));

            match self.request_once(text).await {
                Ok(embedding) => {
                    return Ok(EmbeddingResult {
                        embedding,
                        tokens: estimate_tokens(text),
                    });
                }
                Err((status, e)) => {
                    let retryable = matches!(
                        status,
                        Some(StatusCode::TOO_MANY_REQUESTS) | Some(StatusCode::SERVICE_UNAVAILABLE)
                    );

                    if retryable && attempt < MAX_ATTEMPTS - 1 {
                        let delay = self.base_delay * 2_u32.pow(attempt);
                        tracing::warn!(
                            "Embedding API busy, retrying in {}ms (attempt {}/{})",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_ATTEMPTS
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(e.context("Embedding generation failed"));
                }
            }
        }

        bail!("Embedding generation failed after {} attempts", MAX_ATTEMPTS)
    }
}
