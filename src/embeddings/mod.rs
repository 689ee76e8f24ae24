// Embedding backends and description chunking

#[cfg(test)]
mod tests;

pub mod chunking;
pub mod ollama;
pub mod openai;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;

pub use chunking::{ChunkingConfig, split_text};
pub use ollama::OllamaClient;
pub use openai::OpenAiEmbeddings;

/// Turns text into fixed-length vectors. Implementations perform blocking I/O
/// and are driven from tokio's blocking pool.
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding backend returned no vector for the query"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Hosted OpenAI embeddings
    #[default]
    #[value(name = "openai")]
    OpenAi,
    /// Local Ollama server
    Local,
}

impl fmt::Display for EmbeddingBackend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Build the embedder for `backend`. Asking for OpenAI without an API key
/// falls back to the local backend.
#[inline]
pub fn select_embedder(
    config: &Config,
    backend: EmbeddingBackend,
) -> crate::Result<Arc<dyn Embedder>> {
    let effective = resolve_backend(config, backend);

    let embedder: Arc<dyn Embedder> = match effective {
        EmbeddingBackend::OpenAi => Arc::new(
            OpenAiEmbeddings::new(&config.openai)
                .map_err(|e| crate::RagError::Embedding(format!("{:#}", e)))?,
        ),
        EmbeddingBackend::Local => Arc::new(
            OllamaClient::new(&config.ollama)
                .map_err(|e| crate::RagError::Embedding(format!("{:#}", e)))?,
        ),
    };

    info!(
        "Using {} embeddings with model {}",
        effective,
        embedder.model_name()
    );
    Ok(embedder)
}

/// Backend actually used once credentials are taken into account
#[inline]
pub fn resolve_backend(config: &Config, requested: EmbeddingBackend) -> EmbeddingBackend {
    if requested == EmbeddingBackend::OpenAi && config.openai.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set, falling back to local embeddings");
        return EmbeddingBackend::Local;
    }
    requested
}
