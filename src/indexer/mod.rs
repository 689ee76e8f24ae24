// Indexer module
// Loads technique records, embeds their chunks and populates a collection


use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::database::{VectorEntry, VectorIndex};
use crate::embeddings::Embedder;
use crate::embeddings::chunking::ChunkingConfig;
use crate::techniques::{TechniqueChunk, build_chunks, load_techniques};
use crate::{RagError, Result};

/// Entries written to the collection per insert
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 100;
/// Chunks sent to the embedding backend per request round
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 100;

/// Statistics about an indexing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingStats {
    pub records_loaded: usize,
    pub chunks_created: usize,
    pub entries_written: usize,
    pub duration: Duration,
}

/// Turns a techniques file into a populated collection
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    write_batch_size: usize,
    embed_batch_size: usize,
    show_progress: bool,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            show_progress: console::user_attended_stderr(),
        }
    }

    #[inline]
    pub fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size.max(1);
        self
    }

    #[inline]
    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    #[inline]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[inline]
    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Index `path` into the collection. An existing collection is only
    /// replaced when `force` is set, and only after every chunk has been
    /// embedded.
    #[inline]
    pub async fn index_file(&self, path: &Path, force: bool) -> Result<IndexingStats> {
        let started = Instant::now();

        if !path.is_file() {
            return Err(RagError::Config(format!(
                "Techniques file not found: {}",
                path.display()
            )));
        }

        if self.store.collection_exists().await? {
            if !force {
                return Err(RagError::CollectionExists {
                    path: self.store.location(),
                    collection: self.store.collection_name().to_string(),
                });
            }
            info!("Collection exists at {}, will re-index", self.store.location());
        }

        let records = load_techniques(path)?;

        let chunks = build_chunks(&records, &self.chunking);
        info!(
            "Created {} chunks from {} techniques",
            chunks.len(),
            records.len()
        );

        let entries = self.embed_chunks(chunks).await?;

        if force {
            self.store.drop_collection().await?;
        }
        let entries_written = self.write_entries(&entries).await?;

        if let Err(e) = self.store.optimize().await {
            warn!("Collection optimization failed: {}", e);
        }

        let stats = IndexingStats {
            records_loaded: records.len(),
            chunks_created: entries.len(),
            entries_written,
            duration: started.elapsed(),
        };
        info!(
            "Indexed {} entries from {} records in {:?}",
            stats.entries_written, stats.records_loaded, stats.duration
        );
        Ok(stats)
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template("{spinner} {msg} [{bar:40}] {pos}/{len}")
            .map_or_else(|_| ProgressStyle::default_bar(), |style| style);
        let bar = ProgressBar::new(len as u64).with_style(style);
        bar.set_message(message);
        bar
    }

    /// Embed every chunk before anything is written
    async fn embed_chunks(&self, chunks: Vec<TechniqueChunk>) -> Result<Vec<VectorEntry>> {
        let bar = self.progress_bar(chunks.len(), "Embedding");
        let mut entries = Vec::with_capacity(chunks.len());
        let mut remaining = chunks.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<TechniqueChunk> =
                remaining.by_ref().take(self.embed_batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embedder = Arc::clone(&self.embedder);

            debug!("Embedding batch of {} chunks", texts.len());
            let vectors = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
                .await
                .map_err(|e| RagError::Other(anyhow::anyhow!("Embedding task failed: {}", e)))?
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

            if vectors.len() != batch.len() {
                bar.abandon();
                return Err(RagError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            bar.inc(batch.len() as u64);
            entries.extend(
                batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| VectorEntry::from_chunk(chunk, vector)),
            );
        }

        bar.finish_and_clear();
        Ok(entries)
    }

    /// Write entries in batches, dropping the collection again if any batch fails
    async fn write_entries(&self, entries: &[VectorEntry]) -> Result<usize> {
        let bar = self.progress_bar(entries.len(), "Writing");
        let mut written = 0;

        for batch in entries.chunks(self.write_batch_size) {
            if let Err(e) = self.store.add_entries(batch).await {
                error!(
                    "Write failed after {} of {} entries: {}",
                    written,
                    entries.len(),
                    e
                );
                bar.abandon();
                if let Err(drop_err) = self.store.drop_collection().await {
                    warn!("Failed to drop partially written collection: {}", drop_err);
                }
                return Err(e);
            }
            written += batch.len();
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        Ok(written)
    }
}
