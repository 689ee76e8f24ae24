// Application context built once per command and handed to the pipeline

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::database::{LanceStore, VectorIndex};
use crate::embeddings::{Embedder, EmbeddingBackend, resolve_backend, select_embedder};
use crate::indexer::Indexer;
use crate::retrieval::Retriever;

/// Command-line overrides for the store section of the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOverrides {
    pub path: Option<PathBuf>,
    pub collection: Option<String>,
}

impl StoreOverrides {
    /// Apply on top of file and environment settings, then re-validate
    #[inline]
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(path) = &self.path {
            config.store.path.clone_from(path);
        }
        if let Some(collection) = &self.collection {
            config.store.set_collection(collection.clone())?;
        }
        config.validate()?;
        Ok(())
    }
}

/// Collaborators shared by the indexer, retriever and chat session
pub struct AppContext {
    pub config: Config,
    /// Backend behind `embedder`, after the missing-key fallback
    pub backend: EmbeddingBackend,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorIndex>,
}

impl AppContext {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorIndex>) -> Self {
        Self {
            config,
            backend: EmbeddingBackend::default(),
            embedder,
            store,
        }
    }

    #[inline]
    pub fn with_backend(mut self, backend: EmbeddingBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Select the embedding backend and open the configured LanceDB collection
    #[inline]
    pub async fn build(config: Config, backend: EmbeddingBackend) -> Result<Self> {
        let embedder = select_embedder(&config, backend)?;
        let store = LanceStore::connect(&config.store.path, &config.store.collection).await?;
        info!(
            "Using collection '{}' at {}",
            config.store.collection,
            store.location()
        );
        let backend = resolve_backend(&config, backend);
        Ok(Self::new(config, embedder, Arc::new(store)).with_backend(backend))
    }

    #[inline]
    pub fn indexer(&self) -> Indexer {
        Indexer::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.store),
            self.config.chunking_for(self.backend),
        )
    }

    #[inline]
    pub fn retriever(&self) -> Retriever {
        Retriever::new(Arc::clone(&self.embedder), Arc::clone(&self.store))
    }
}
