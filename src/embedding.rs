//! Embedding provider abstraction and implementations.
//!
//! The [`Embedder`] trait is the single seam between the pipeline and the
//! embedding capability. Two backends ship with the binary:
//! - **[`OllamaEmbedder`]**: local Ollama server, `POST /api/embed`.
//! - **[`OpenAiEmbedder`]**: OpenAI embeddings API with retry and backoff.
//!
//! Retry strategy (both providers): HTTP 429 and 5xx retry with exponential
//! backoff (1s, 2s, 4s, ... capped at 32s); other 4xx fail immediately;
//! network errors retry.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding provider returned {returned} vectors for {expected} inputs")]
    CountMismatch { expected: usize, returned: usize },
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("unknown embedding provider: {0}")]
    UnknownProvider(String),
}

/// The embedding capability: text in, fixed-length vectors out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embedding dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query string.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                returned: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Instantiate the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => Err(EmbeddingError::UnknownProvider(other.to_string())),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, EmbeddingError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EmbeddingError::Request(e.to_string()))
}

// ============ Ollama ============

/// Embedding via a local Ollama server (`POST {host}/api/embed`), with retry.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    host: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/api/embed", self.host);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
                        let vectors = parse_vector_array(&json, "embeddings")?;
                        if vectors.len() != texts.len() {
                            return Err(EmbeddingError::CountMismatch {
                                expected: texts.len(),
                                returned: vectors.len(),
                            });
                        }
                        return Ok(vectors);
                    }

                    // Overloaded or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbeddingError::Request(format!(
                            "Ollama returned {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Other client error: fail immediately
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::Request(format!(
                        "Ollama returned {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::Request(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbeddingError::Request("embedding failed after retries".into())))
    }
}

// ============ OpenAI ============

/// Embedding via the OpenAI API (`POST /v1/embeddings`), with retry.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| EmbeddingError::MissingApiKey)?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
                        let vectors = parse_openai_response(&json)?;
                        if vectors.len() != texts.len() {
                            return Err(EmbeddingError::CountMismatch {
                                expected: texts.len(),
                                returned: vectors.len(),
                            });
                        }
                        return Ok(vectors);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbeddingError::Request(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Other client error: fail immediately
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::Request(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::Request(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbeddingError::Request("embedding failed after retries".into())))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data array".into()))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".into()))?;
        vectors.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(vectors)
}

fn parse_vector_array(
    json: &serde_json::Value,
    field: &str,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let rows = json
        .get(field)
        .and_then(|v| v.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse(format!("missing {} array", field)))?;

    let mut vectors = Vec::with_capacity(rows.len());
    for row in rows {
        let values = row
            .as_array()
            .ok_or_else(|| EmbeddingError::InvalidResponse("embedding is not an array".into()))?;
        vectors.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(vectors)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn parses_openai_embedding_payload() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn parses_ollama_embedding_payload() {
        let json = serde_json::json!({ "embeddings": [[1.0, 0.0], [0.0, 1.0]] });
        let vectors = parse_vector_array(&json, "embeddings").unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![1.0, 0.0]);
    }

    #[test]
    fn missing_payload_field_is_invalid_response() {
        let json = serde_json::json!({ "nope": [] });
        assert!(matches!(
            parse_vector_array(&json, "embeddings"),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    /// Serve each canned response to one connection, in order, then stop.
    async fn serve_responses(responses: Vec<String>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn ollama_embed_retries_server_errors() {
        let host = serve_responses(vec![
            http_response("500 Internal Server Error", "{}"),
            http_response("200 OK", r#"{"embeddings": [[1.0, 0.0]]}"#),
        ])
        .await;

        let config = EmbeddingConfig {
            host,
            max_retries: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let vectors = embedder.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0]]);
    }
}
