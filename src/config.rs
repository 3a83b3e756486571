use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Root directory for per-user knowledge base indexes. Each user's
    /// index lives under `<root>/<user_id>/`.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_chunk_words() -> usize {
    600
}
fn default_overlap_words() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to count as relevant.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_min_score() -> f32 {
    0.35
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `ollama` or `openai`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_host")]
    pub host: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            host: default_embedding_host(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_embedding_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `ollama` (local) or `groq` (hosted). Selected once at startup; the
    /// pipeline only ever sees the resulting provider.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Base URL for the Ollama server. Ignored by the groq provider.
    #[serde(default = "default_llm_host")]
    pub host: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Character budget for retrieved context in the prompt.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            host: default_llm_host(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_tokens(),
            context_chars: default_context_chars(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3".to_string()
}
fn default_llm_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    /// `retrieval`: mean similarity of the retrieved chunks, scaled to 0-100.
    /// `model`: a trailing `Confidence: N` line reported by the model,
    /// falling back to `retrieval` when absent.
    #[serde(default = "default_confidence_source")]
    pub source: String,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            source: default_confidence_source(),
        }
    }
}

fn default_confidence_source() -> String {
    "retrieval".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_words == 0 {
        anyhow::bail!("chunking.chunk_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.chunk_words {
        anyhow::bail!("chunking.overlap_words must be < chunking.chunk_words");
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or openai.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "ollama" | "groq" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be ollama or groq.", other),
    }
    if config.llm.context_chars == 0 {
        anyhow::bail!("llm.context_chars must be > 0");
    }

    match config.confidence.source.as_str() {
        "retrieval" | "model" => {}
        other => anyhow::bail!(
            "Unknown confidence source: '{}'. Must be retrieval or model.",
            other
        ),
    }

    Ok(())
}
