#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Embedder;
use crate::config::OpenAiConfig;
use crate::http::HttpClient;

const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Client for the hosted `/v1/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    http: HttpClient,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbeddings {
    /// Requires `config.api_key` to be set
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is required for OpenAI embeddings")?;

        let http = HttpClient::new(&config.base_url)?
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_bearer_token(api_key);

        Ok(Self {
            http,
            model: config.embedding_model.clone(),
            batch_size: (config.batch_size as usize).max(1),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.http = self.http.with_backoff_unit(unit);
        self
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbeddingsResponse = self
            .http
            .post_json(EMBEDDINGS_PATH, &request)
            .context("Failed to generate OpenAI embeddings")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

impl Embedder for OpenAiEmbeddings {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Requesting {} OpenAI embeddings with model {}",
            texts.len(),
            self.model
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(
                self.embed_batch(batch)
                    .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?,
            );
        }

        Ok(embeddings)
    }
}
