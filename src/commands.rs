use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::{AppContext, StoreOverrides};
use crate::chat::{
    ChatModel, ChatSession, CheckpointStore, OpenAiChatModel, SessionEnd, SessionOptions,
    spawn_line_reader,
};
use crate::config::{Config, run_interactive_config, show_config};
use crate::database::{LanceStore, VectorIndex};
use crate::embeddings::{EmbeddingBackend, OllamaClient, resolve_backend};
use crate::indexer::IndexingStats;
use crate::{RagError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub techniques_file: Option<PathBuf>,
    pub store: StoreOverrides,
    pub backend: EmbeddingBackend,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatOptions {
    pub store: StoreOverrides,
    pub backend: EmbeddingBackend,
    pub num_similar: Option<usize>,
    pub thread: Option<String>,
}

/// Snapshot of a collection for `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub path: PathBuf,
    pub collection: String,
    pub exists: bool,
    pub entries: usize,
    pub dimension: Option<usize>,
}

/// Verify the Ollama server before local embeddings are used. A failed check
/// only warns; the first embedding request reports the real error.
async fn check_local_embeddings(config: &Config, backend: EmbeddingBackend) {
    if resolve_backend(config, backend) != EmbeddingBackend::Local {
        return;
    }

    let ollama = config.ollama.clone();
    let checked = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&ollama).and_then(|client| client.health_check())
    })
    .await;

    match checked {
        Ok(Ok(())) => info!("Ollama is ready for local embeddings"),
        Ok(Err(e)) => {
            warn!("Ollama health check failed: {:#}", e);
            println!(
                "{} Ollama may not be ready at {}:{}. Use 'attack-rag config' to update connection settings.",
                style("⚠️").yellow(),
                config.ollama.host,
                config.ollama.port
            );
        }
        Err(e) => warn!("Ollama health check did not complete: {}", e),
    }
}

/// Build the vector collection from the techniques file
#[inline]
pub async fn index_techniques(mut config: Config, options: IndexOptions) -> Result<IndexingStats> {
    options.store.apply(&mut config)?;
    if let Some(file) = options.techniques_file {
        config.store.techniques_file = file;
    }

    let techniques_file = config.store.techniques_file.clone();
    if !techniques_file.is_file() {
        return Err(RagError::Config(format!(
            "Techniques file not found: {}",
            techniques_file.display()
        )));
    }

    println!(
        "Indexing {} into collection '{}' at {}",
        techniques_file.display(),
        config.store.collection,
        config.store.path.display()
    );

    check_local_embeddings(&config, options.backend).await;
    let context = AppContext::build(config, options.backend).await?;
    let stats = context
        .indexer()
        .index_file(&techniques_file, options.force)
        .await?;

    println!("{}", style("✅ Indexing completed").green().bold());
    println!("  Techniques loaded: {}", stats.records_loaded);
    println!("  Chunks embedded: {}", stats.chunks_created);
    println!("  Entries written: {}", stats.entries_written);
    println!("  Duration: {:.1?}", stats.duration);

    Ok(stats)
}

fn missing_collection(collection: &str, location: &str) -> RagError {
    RagError::Config(format!(
        "Collection '{}' not found at {}. Run `attack-rag index` first",
        collection, location
    ))
}

/// Run the interactive chatbot on stdin/stdout until exit or Ctrl-C
#[inline]
pub async fn run_chat(mut config: Config, options: &ChatOptions) -> Result<SessionEnd> {
    options.store.apply(&mut config)?;
    config.require_api_key()?;
    let num_similar = options.num_similar.unwrap_or(config.retrieval.num_similar);

    let model: Arc<dyn ChatModel> = Arc::new(
        OpenAiChatModel::new(&config.openai).map_err(|e| RagError::Model(format!("{:#}", e)))?,
    );
    info!("Language model configured: {}", model.model_name());

    if !config.store.path.is_dir() {
        return Err(missing_collection(
            &config.store.collection,
            &config.store.path.display().to_string(),
        ));
    }

    check_local_embeddings(&config, options.backend).await;
    let context = AppContext::build(config, options.backend).await?;
    if !context.store.collection_exists().await? {
        return Err(missing_collection(
            context.store.collection_name(),
            &context.store.location(),
        ));
    }
    println!(
        "{} Index loaded from: {}",
        style("✅").green(),
        context.store.location()
    );

    let session_options = SessionOptions::from_config(&context.config.chat, num_similar);
    let mut session = ChatSession::new(context.retriever(), model, session_options);
    if let Some(thread_id) = &options.thread {
        let store = CheckpointStore::new(context.config.threads_dir());
        let threads_dir = store.dir().to_path_buf();
        session = session.with_checkpoint(store, thread_id).await?;
        println!(
            "Thread '{}' ({} earlier turns) saved under {}",
            thread_id,
            session.transcript().conversation().count(),
            threads_dir.display()
        );
    }

    let input = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let mut stdout = std::io::stdout();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    session.run(input, &mut stdout, interrupt).await
}

/// Inspect a collection without creating it
#[inline]
pub async fn collection_status(mut config: Config, overrides: &StoreOverrides) -> Result<CollectionStatus> {
    overrides.apply(&mut config)?;
    let path = config.store.path.clone();
    let collection = config.store.collection.clone();

    if !path.is_dir() {
        return Ok(CollectionStatus {
            path,
            collection,
            exists: false,
            entries: 0,
            dimension: None,
        });
    }

    let store = LanceStore::connect(&path, &collection).await?;
    Ok(CollectionStatus {
        path: store.path().to_path_buf(),
        collection,
        exists: store.collection_exists().await?,
        entries: store.count_entries().await?,
        dimension: store.vector_dimension().await?,
    })
}

#[inline]
pub async fn show_status(config: Config, overrides: &StoreOverrides) -> Result<CollectionStatus> {
    let status = collection_status(config, overrides).await?;

    println!("{}", style("📊 Collection Status").bold().cyan());
    println!("  Location: {}", status.path.display());
    println!("  Collection: {}", status.collection);
    if status.exists {
        println!("  State: {}", style("indexed").green());
        println!("  Entries: {}", status.entries);
        if let Some(dimension) = status.dimension {
            println!("  Vector dimension: {}", dimension);
        }
    } else {
        println!("  State: {}", style("missing").yellow());
        println!("  Run `attack-rag index` to build it.");
    }

    Ok(status)
}

/// `config --show` prints the merged configuration, otherwise the
/// interactive editor runs against `config.toml`
#[inline]
pub fn configure(config: &Config, show: bool) -> Result<()> {
    if show {
        show_config(config);
        return Ok(());
    }
    run_interactive_config(config.base_dir())?;
    Ok(())
}
