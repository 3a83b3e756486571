//! LLM completion providers.
//!
//! The [`LlmProvider`] trait is the only surface the answer generator sees.
//! Provider selection happens once at startup from config ([`create_provider`]):
//! - **[`OllamaProvider`]**: local model via `POST {host}/api/generate`.
//! - **[`GroqProvider`]**: hosted, OpenAI-compatible chat completions;
//!   the API key comes from `GROQ_API_KEY`.
//!
//! Both run with temperature 0 and a bounded output length, one synchronous
//! call per question with a request timeout.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM request timed out")]
    Timeout,
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
    #[error("GROQ_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("unknown llm provider: {0}")]
    UnknownProvider(String),
}

impl LlmError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

/// The generation capability: prompt in, completion text out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Instantiate the provider named by the configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "groq" => Ok(Box::new(GroqProvider::new(config)?)),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::Request(e.to_string()))
}

// ============ Ollama ============

pub struct OllamaProvider {
    client: reqwest::Client,
    host: String,
    model: String,
    max_tokens: u32,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0,
                "num_predict": self.max_tokens,
            }
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Request(format!(
                "Ollama returned {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("missing response field".into()))
    }
}

// ============ Groq ============

pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl GroqProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("GROQ_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(GROQ_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Request(format!(
                "Groq returned {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))
    }
}
