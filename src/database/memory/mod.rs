// In-process collection with exact cosine search


use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::RwLock;

use super::{SearchResult, VectorEntry, VectorIndex};
use crate::{RagError, Result};

/// Collection held in memory. `None` means the collection does not exist yet.
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<Option<Vec<VectorEntry>>>,
}

impl MemoryStore {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(None),
        }
    }

    fn poisoned() -> RagError {
        RagError::Database("Memory store lock poisoned".to_string())
    }
}

/// Cosine distance in `[0, 2]`; zero vectors are maximally distant
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 1.0;
    }
    1.0 - dot / denominator
}

#[async_trait]
impl VectorIndex for MemoryStore {
    #[inline]
    fn location(&self) -> String {
        "memory".to_string()
    }

    #[inline]
    fn collection_name(&self) -> &str {
        &self.name
    }

    #[inline]
    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.entries.read().map_err(|_| Self::poisoned())?.is_some())
    }

    #[inline]
    async fn drop_collection(&self) -> Result<()> {
        *self.entries.write().map_err(|_| Self::poisoned())? = None;
        Ok(())
    }

    #[inline]
    async fn add_entries(&self, entries: &[VectorEntry]) -> Result<()> {
        let mut guard = self.entries.write().map_err(|_| Self::poisoned())?;

        let expected = guard
            .as_ref()
            .and_then(|stored| stored.first())
            .or_else(|| entries.first())
            .map(|entry| entry.vector.len());
        let mismatch = expected.and_then(|dim| {
            entries
                .iter()
                .find(|entry| entry.vector.len() != dim)
                .map(|bad| (bad, dim))
        });
        if let Some((bad, dim)) = mismatch {
            return Err(RagError::Database(format!(
                "Entry {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                dim
            )));
        }

        let stored = guard.get_or_insert_with(Vec::new);
        stored.extend_from_slice(entries);
        Ok(())
    }

    #[inline]
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        technique_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let guard = self.entries.read().map_err(|_| Self::poisoned())?;
        let Some(entries) = guard.as_ref() else {
            return Err(RagError::Database(format!(
                "Collection '{}' does not exist",
                self.name
            )));
        };

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|entry| technique_filter.is_none_or(|id| entry.metadata.technique_id == id))
            .map(|entry| (cosine_distance(query, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(distance, entry)| SearchResult {
                entry_id: entry.id.clone(),
                content: entry.content.clone(),
                chunk_index: entry.chunk_index,
                metadata: entry.metadata.clone(),
                similarity_score: 1.0 - distance,
                distance,
            })
            .collect())
    }

    #[inline]
    async fn count_entries(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| Self::poisoned())?
            .as_ref()
            .map_or(0, Vec::len))
    }

    #[inline]
    async fn optimize(&self) -> Result<()> {
        Ok(())
    }
}
