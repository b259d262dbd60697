//! HTTP client for the document/question service.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::auth::JwtKeys;
use crate::questions::Question;
use crate::response::{ApiResponse, ErrorBody};

/// Subject of the tokens the quiz service mints for itself.
pub const SERVICE_SUBJECT: &str = "quiz-service";

const SERVICE_TOKEN_TTL_MINUTES: i64 = 10;
const FORWARD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Clone)]
pub struct McpClient {
    http: reqwest::Client,
    base_url: String,
    jwt: JwtKeys,
    health_timeout: Duration,
    generate_timeout: Duration,
}

impl McpClient {
    pub fn new(
        base_url: impl Into<String>,
        jwt: JwtKeys,
        health_timeout: Duration,
        generate_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jwt,
            health_timeout,
            generate_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token_for(&self, subject: &str) -> Result<String> {
        self.jwt
            .issue(subject, None, chrono::Duration::minutes(SERVICE_TOKEN_TTL_MINUTES))
    }

    /// True when `/health` answers 2xx within the health timeout.
    pub async fn health(&self) -> bool {
        let result = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("Document service health returned {}", response.status());
                false
            }
            Err(e) => {
                tracing::warn!("Document service unreachable: {}", e);
                false
            }
        }
    }

    /// Requests a generated set. Any non-2xx answer, including
    /// `MIXTRAL_UNAVAILABLE`, and an empty list are errors.
    pub async fn generate(&self, session_id: &str, tags: &[String], count: usize) -> Result<Vec<Question>> {
        let token = self.token_for(SERVICE_SUBJECT)?;
        let response = self
            .http
            .post(format!("{}/api/questions/generate", self.base_url))
            .bearer_auth(token)
            .timeout(self.generate_timeout)
            .json(&json!({
                "tags": tags,
                "questionCount": count,
                "sessionId": session_id,
                "difficulty": "mixed",
            }))
            .send()
            .await
            .context("Question generation request failed")?;

        let status = response.status();
        let body: ApiResponse<GeneratedQuestions> = response
            .json()
            .await
            .context("Invalid response from document service")?;

        if !status.is_success() || !body.success {
            let error = body.error.unwrap_or_else(|| ErrorBody {
                message: "unknown error".to_string(),
                code: None,
                details: None,
            });
            bail!(
                "Document service returned {} ({}): {}",
                status,
                error.code.as_deref().unwrap_or("NO_CODE"),
                error.message
            );
        }

        let questions = body
            .data
            .map(|d| d.questions)
            .ok_or_else(|| anyhow!("Document service response had no data"))?;
        if questions.is_empty() {
            bail!("Document service generated no questions");
        }
        Ok(questions)
    }

    /// Sends an uploaded file to the processing endpoint on behalf of `user_id`.
    pub async fn forward_document(
        &self,
        user_id: &str,
        file_id: &str,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
        tags: &[String],
    ) -> Result<Value> {
        let token = self.token_for(user_id)?;
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .context("Invalid mime type")?;
        let form = Form::new()
            .part("file", part)
            .text("tags", serde_json::to_string(tags)?)
            .text("fileId", file_id.to_string());

        let response = self
            .http
            .post(format!("{}/api/documents/process", self.base_url))
            .bearer_auth(token)
            .timeout(FORWARD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .context("Document processing request failed")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            bail!("Document processing returned {}: {}", status, body);
        }
        Ok(body)
    }
}
