use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;

const GRADING_PROMPT_TEMPLATE: &str = "You are an examiner. Grade the student's answer:\n\n\
{answer}\n\n\
Give score (0-{total}) and feedback in JSON format like:\n\
{\"score\": 8, \"feedback\": \"Good explanation with minor mistakes\"}";

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("grading service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("grading service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("grading service did not answer within {0:?}")]
    Timeout(Duration),
    #[error("grading service returned an unexpected body: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub(crate) trait GradingClient: Send + Sync {
    /// Returns the model's raw text; interpreting it is the parser's job.
    async fn grade(&self, extracted_text: &str, max_score: u32) -> Result<String, ServiceError>;
}

pub(crate) fn build_grading_prompt(extracted_text: &str, max_score: u32) -> String {
    // Total first, so placeholder-like text inside the answer is left alone.
    GRADING_PROMPT_TEMPLATE
        .replacen("{total}", &max_score.to_string(), 1)
        .replacen("{answer}", extracted_text, 1)
}

/// OpenAI-compatible chat completions client (Groq by default).
#[derive(Debug, Clone)]
pub(crate) struct AiGradingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
}

impl AiGradingService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ai = settings.ai();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.ai_request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: ai.openai_api_key.clone(),
            base_url: ai.openai_base_url.trim_end_matches('/').to_string(),
            model: ai.ai_model.clone(),
            temperature: ai.ai_temperature,
        })
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl GradingClient for AiGradingService {
    async fn grade(&self, extracted_text: &str, max_score: u32) -> Result<String, ServiceError> {
        let timer = Instant::now();
        let prompt = build_grading_prompt(extracted_text, max_score);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::info!(model = %self.model, prompt_chars = prompt.len(), "Sending grading request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(&prompt))
            .send()
            .await
            .map_err(|err| transport_error(err, timer))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| transport_error(err, timer))?;
        if !status.is_success() {
            return Err(ServiceError::Status { status, body });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|err| ServiceError::MalformedResponse(format!("{err}: {body}")))?;
        let content = completion_content(&parsed).ok_or_else(|| {
            ServiceError::MalformedResponse("missing choices[0].message.content".to_string())
        })?;

        let tokens_used =
            parsed.get("usage").and_then(|usage| usage.get("total_tokens")).and_then(Value::as_u64);
        tracing::info!(
            model = %self.model,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used,
            "Grading response received"
        );

        Ok(content.trim().to_string())
    }
}

fn transport_error(err: reqwest::Error, started: Instant) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(started.elapsed())
    } else {
        ServiceError::Transport(err)
    }
}

fn completion_content(body: &Value) -> Option<&str> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
}
