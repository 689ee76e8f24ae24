// Vector collections: the storage seam shared by the indexer and the retriever

#[cfg(test)]
mod tests;

pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::techniques::{TechniqueChunk, TechniqueMetadata};

pub use self::lancedb::LanceStore;
pub use memory::MemoryStore;

/// One stored chunk: text, embedding and technique metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub chunk_index: u32,
    pub metadata: TechniqueMetadata,
    pub created_at: DateTime<Utc>,
}

impl VectorEntry {
    #[inline]
    pub fn from_chunk(chunk: TechniqueChunk, vector: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            content: chunk.content,
            chunk_index: chunk.chunk_index,
            metadata: chunk.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry_id: String,
    pub content: String,
    pub chunk_index: u32,
    pub metadata: TechniqueMetadata,
    /// `1 - distance`; higher is more similar
    pub similarity_score: f32,
    /// Cosine distance reported by the store
    pub distance: f32,
}

/// A named collection of vector entries
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Where the collection lives, e.g. the store directory
    fn location(&self) -> String;

    fn collection_name(&self) -> &str;

    async fn collection_exists(&self) -> Result<bool>;

    /// Remove the collection; a missing collection is not an error
    async fn drop_collection(&self) -> Result<()>;

    /// Append entries, creating the collection from the first batch
    async fn add_entries(&self, entries: &[VectorEntry]) -> Result<()>;

    /// Nearest entries by cosine distance, optionally restricted to one technique id
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        technique_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>>;

    async fn count_entries(&self) -> Result<usize>;

    async fn optimize(&self) -> Result<()>;
}
