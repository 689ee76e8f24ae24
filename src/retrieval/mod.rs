// Query-time similarity search over an indexed collection

#[cfg(test)]
mod tests;

pub mod context;

use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

use crate::database::{SearchResult, VectorIndex};
use crate::embeddings::Embedder;
use crate::text::{clean_text, extract_technique_id, truncate_text};
use crate::{RagError, Result};

pub use context::{NOT_AVAILABLE, RETRIEVAL_ERROR_CONTEXT, render_block, render_context};

/// Default number of chunks placed in a prompt
pub const DEFAULT_NUM_SIMILAR: usize = 6;

/// Embeds questions and fetches the nearest chunks
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorIndex>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, store }
    }

    /// At most `k` chunks ranked by similarity to `query`. A technique id in
    /// the query pulls that technique's chunks to the front.
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&text))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let pinned = match extract_technique_id(query) {
            Some(id) => {
                debug!("Query mentions {}, searching its chunks first", id);
                self.store.search(&vector, k, Some(&id)).await?
            }
            None => Vec::new(),
        };

        let results: Vec<SearchResult> = if pinned.len() >= k {
            pinned.into_iter().take(k).collect()
        } else {
            let general = self.store.search(&vector, k, None).await?;
            pinned
                .into_iter()
                .chain(general)
                .unique_by(|result| result.entry_id.clone())
                .take(k)
                .collect()
        };

        for result in &results {
            debug!(
                "{} #{} ({:.3}): {}",
                result.metadata.technique_id,
                result.chunk_index,
                result.similarity_score,
                truncate_text(&clean_text(&result.content), 120, "...")
            );
        }
        Ok(results)
    }

    /// Retrieve and render in one step
    #[inline]
    pub async fn build_context(&self, query: &str, k: usize) -> Result<String> {
        let results = self.retrieve(query, k).await?;
        Ok(render_context(&results))
    }
}
