use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{QuestionGenerationRequest, QuestionGenerator};
use crate::config::GeneratorConfig;
use crate::questions::{Difficulty, Question};
use crate::request_counter::RequestCounter;

const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat-completions endpoint serving Mixtral.
pub struct MixtralGenerator {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: Option<String>,
    model: String,
    timeout: Duration,
    counter: RequestCounter,
}

impl MixtralGenerator {
    pub fn new(config: &GeneratorConfig, counter: RequestCounter) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
            counter,
        }
    }

    fn endpoint(&self) -> Result<(&str, String)> {
        match (&self.api_key, &self.api_url) {
            (Some(key), Some(url)) => Ok((key.as_str(), format!("{}/chat/completions", url))),
            (None, _) => bail!("Mixtral API key not configured"),
            (_, None) => bail!("Mixtral API URL not configured"),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let (api_key, url) = self.endpoint()?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: Some(TOP_P),
        };

        let res = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("Mixtral request failed")?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Mixtral error {}: {}", status, text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse Mixtral response: {} | body: {}", e, text))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("Mixtral returned no choices"))
    }
}

#[async_trait]
impl QuestionGenerator for MixtralGenerator {
    async fn generate(&self, request: &QuestionGenerationRequest) -> Result<Vec<Question>> {
        self.endpoint()?;

        self.counter.log_generation_request(&format!(
            "{} questions from {} contexts",
            request.question_count,
            request.contexts.len()
        ));
        tracing::info!("Generating {} questions using Mixtral", request.question_count);

        let generated = self.complete(&build_prompt(request)).await?;
        let questions = parse_questions(&generated, &request.tags).inspect_err(|e| {
            tracing::error!("Failed to parse generated questions: {} | raw: {}", e, generated);
        })?;

        tracing::info!("Successfully generated {} questions", questions.len());
        Ok(questions)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.api_url.is_some()
    }

    async fn test_connection(&self) -> bool {
        let Ok((api_key, url)) = self.endpoint() else {
            return false;
        };

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "Test connection. Respond with just \"OK\".",
            }],
            max_tokens: 10,
            temperature: 0.0,
            top_p: None,
        };

        match self
            .http
            .post(url)
            .bearer_auth(api_key)
            .timeout(TEST_TIMEOUT)
            .json(&body)
            .send()
            .await
        {
            Ok(res) => res.status().is_success(),
            Err(e) => {
                tracing::warn!("Mixtral connection test failed: {}", e);
                false
            }
        }
    }
}

pub fn build_prompt(request: &QuestionGenerationRequest) -> String {
    let count = request.question_count;
    let contexts = request
        .contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("--- Context {} ---\n{}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an expert educational content creator. Based on the following educational content, generate {count} multiple-choice questions that test deep understanding and critical thinking.

CONTENT CONTEXTS:
{contexts}

REQUIREMENTS:
- Generate exactly {count} questions
- Topics/Tags: {tags}
- Difficulty: {difficulty}
- Each question must have exactly 4 multiple choice options (A, B, C, D)
- Questions should test understanding, analysis, and application - not just memorization
- Include clear explanations for why the correct answer is right
- Vary question types: conceptual, analytical, application-based
- Ensure questions are directly relevant to the provided content

OUTPUT FORMAT (JSON):
{{
  "questions": [
    {{
      "question": "Clear, specific question text?",
      "options": ["Option A text", "Option B text", "Option C text", "Option D text"],
      "correctAnswer": 0,
      "explanation": "Detailed explanation of why this answer is correct and others are wrong",
      "difficulty": "medium",
      "source": "Brief reference to which part of content this comes from"
    }}
  ]
}}

Generate the questions now - respond ONLY with valid JSON:"#,
        tags = request.tags.join(", "),
        difficulty = request.difficulty.as_str(),
    )
}

/// Pulls the outermost JSON object out of free-form model output and fills
/// in whatever fields the model left out.
pub fn parse_questions(text: &str, tags: &[String]) -> Result<Vec<Question>> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        bail!("No JSON found in LLM response");
    };
    if end < start {
        bail!("No JSON found in LLM response");
    }

    let parsed: Value =
        serde_json::from_str(&text[start..=end]).context("Invalid question format received from LLM")?;
    let items = parsed
        .get("questions")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid JSON structure - missing questions array"))?;

    Ok(items
        .iter()
        .enumerate()
        .map(|(i, item)| question_from_value(i, item, tags))
        .collect())
}

fn question_from_value(index: usize, item: &Value, tags: &[String]) -> Question {
    let text_field = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let options: Vec<String> = match item.get("options").and_then(Value::as_array) {
        Some(opts) if !opts.is_empty() => opts
            .iter()
            .map(|o| match o {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
    };

    let correct_answer = item
        .get("correctAnswer")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .filter(|&n| n < options.len())
        .unwrap_or(0);

    let difficulty = item
        .get("difficulty")
        .cloned()
        .and_then(|v| serde_json::from_value::<Difficulty>(v).ok())
        .unwrap_or(Difficulty::Medium);

    Question {
        id: 0,
        question: text_field("question").unwrap_or_else(|| format!("Question {}", index + 1)),
        options,
        correct_answer,
        explanation: text_field("explanation")
            .unwrap_or_else(|| "No explanation provided".to_string()),
        difficulty: Some(difficulty),
        tags: tags.to_vec(),
        source: Some(text_field("source").unwrap_or_else(|| "Generated content".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::json;

    fn request() -> QuestionGenerationRequest {
        QuestionGenerationRequest {
            contexts: vec!["Joins combine rows.".to_string(), "Indexes speed reads.".to_string()],
            tags: vec!["sql".to_string()],
            question_count: 3,
            difficulty: Difficulty::Mixed,
        }
    }

    #[test]
    fn test_prompt_numbers_contexts() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("--- Context 1 ---\nJoins combine rows."));
        assert!(prompt.contains("--- Context 2 ---\nIndexes speed reads."));
        assert!(prompt.contains("Generate exactly 3 questions"));
        assert!(prompt.contains("Difficulty: mixed"));
        assert!(prompt.contains("\"questions\": ["));
    }

    #[test]
    fn test_parse_fills_defaults_and_clamps() {
        let text = r#"Sure! Here you go:
        {"questions": [
            {"question": "What does a join do?", "options": ["a","b","c","d"], "correctAnswer": 2, "difficulty": "hard"},
            {"correctAnswer": 9},
            {"question": "", "options": [1, 2], "difficulty": "impossible"}
        ]}
        Hope this helps."#;
        let tags = vec!["sql".to_string()];
        let qs = parse_questions(text, &tags).unwrap();

        assert_eq!(qs.len(), 3);
        assert_eq!(qs[0].correct_answer, 2);
        assert_eq!(qs[0].difficulty, Some(Difficulty::Hard));
        assert_eq!(qs[0].tags, tags);
        assert_eq!(qs[0].source.as_deref(), Some("Generated content"));

        assert_eq!(qs[1].question, "Question 2");
        assert_eq!(qs[1].options, vec!["A", "B", "C", "D"]);
        assert_eq!(qs[1].correct_answer, 0);
        assert_eq!(qs[1].explanation, "No explanation provided");

        assert_eq!(qs[2].question, "Question 3");
        assert_eq!(qs[2].options, vec!["1", "2"]);
        assert_eq!(qs[2].difficulty, Some(Difficulty::Medium));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_questions("I cannot help with that.", &[]).is_err());
        assert!(parse_questions("} backwards {", &[]).is_err());
        assert!(parse_questions(r#"{"items": []}"#, &[]).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_generator() {
        let generator = MixtralGenerator::new(
            &GeneratorConfig {
                api_key: None,
                api_url: None,
                model: "m".to_string(),
                timeout: Duration::from_secs(1),
            },
            RequestCounter::new(),
        );
        assert!(!generator.is_configured());
        assert!(!generator.test_connection().await);
        assert!(generator.generate(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_generate_against_fake_endpoint() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "mixtral");
                let content = json!({"questions": [
                    {"question": "Q?", "options": ["x","y"], "correctAnswer": 1, "explanation": "because"}
                ]})
                .to_string();
                Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let counter = RequestCounter::new();
        let generator = MixtralGenerator::new(
            &GeneratorConfig {
                api_key: Some("key".to_string()),
                api_url: Some(format!("http://{}/v1", addr)),
                model: "mixtral".to_string(),
                timeout: Duration::from_secs(5),
            },
            counter.clone(),
        );

        let qs = generator.generate(&request()).await.unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].correct_answer, 1);
        assert_eq!(qs[0].explanation, "because");
        assert_eq!(counter.generation_count(), 1);
        assert!(generator.test_connection().await);
    }
}
