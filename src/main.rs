use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use attack_rag::app::StoreOverrides;
use attack_rag::chat::SHUTDOWN_GRACE;
use attack_rag::commands::{ChatOptions, IndexOptions, configure, index_techniques, run_chat, show_status};
use attack_rag::config::{Config, resolve_config_dir};
use attack_rag::embeddings::EmbeddingBackend;
use attack_rag::{RagError, Result};

#[derive(Parser)]
#[command(name = "attack-rag")]
#[command(about = "MITRE ATT&CK technique indexer and retrieval-augmented chatbot")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and saved chat threads
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct StoreArgs {
    /// Vector store directory
    #[arg(short = 'v', long = "vector-store")]
    vector_store: Option<PathBuf>,
    /// Collection (table) name inside the vector store
    #[arg(short = 'c', long)]
    collection: Option<String>,
}

impl StoreArgs {
    fn overrides(&self) -> StoreOverrides {
        StoreOverrides {
            path: self.vector_store.clone(),
            collection: self.collection.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Embed the techniques file into a vector collection
    Index {
        /// JSON file with technique records
        #[arg(short = 't', long = "techniques")]
        techniques: Option<PathBuf>,
        #[command(flatten)]
        store: StoreArgs,
        /// Embedding backend
        #[arg(short = 'e', long, value_enum, default_value_t = EmbeddingBackend::OpenAi)]
        embeddings: EmbeddingBackend,
        /// Replace an existing collection
        #[arg(long)]
        force: bool,
    },
    /// Ask questions about techniques, tactics and mitigations
    Chat {
        #[command(flatten)]
        store: StoreArgs,
        /// Embedding backend; must match the one used for indexing
        #[arg(short = 'e', long, value_enum, default_value_t = EmbeddingBackend::OpenAi)]
        embeddings: EmbeddingBackend,
        /// Number of chunks to place in each prompt
        #[arg(short = 'n', long = "num-similar")]
        num_similar: Option<usize>,
        /// Log retrieval and prompt details
        #[arg(short = 'd', long)]
        debug: bool,
        /// Save and resume the conversation under this id
        #[arg(long)]
        thread: Option<String>,
    },
    /// Show location, existence and size of a collection
    Status {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Configure models, endpoints and storage
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

impl Cli {
    fn debug(&self) -> bool {
        matches!(self.command, Commands::Chat { debug: true, .. })
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "attack_rag=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_dir: &std::path::Path) -> Result<Config> {
    Config::load_with_env(config_dir).map_err(|e| RagError::Config(format!("{:#}", e)))
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Index {
            techniques,
            store,
            embeddings,
            force,
        } => {
            let options = IndexOptions {
                techniques_file: techniques,
                store: store.overrides(),
                backend: embeddings,
                force,
            };
            index_techniques(load_config(&config_dir)?, options).await?;
        }
        Commands::Chat {
            store,
            embeddings,
            num_similar,
            thread,
            ..
        } => {
            let options = ChatOptions {
                store: store.overrides(),
                backend: embeddings,
                num_similar,
                thread,
            };
            run_chat(load_config(&config_dir)?, &options).await?;
        }
        Commands::Status { store } => {
            show_status(load_config(&config_dir)?, &store.overrides()).await?;
        }
        Commands::Config { show } => {
            configure(&load_config(&config_dir)?, show)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.debug());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}", style("❌ Error:").red().bold(), style(&e).red());
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli));
    // Model or embedding calls abandoned by Ctrl-C or a turn timeout are not
    // waited for
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("❌ Error:").red().bold(), style(&e).red());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn index_defaults() {
        let cli = Cli::try_parse_from(["attack-rag", "index"]).expect("should parse");

        let Commands::Index {
            techniques,
            store,
            embeddings,
            force,
        } = cli.command
        else {
            panic!("expected index command");
        };
        assert_eq!(techniques, None);
        assert_eq!(store.overrides(), StoreOverrides::default());
        assert_eq!(embeddings, EmbeddingBackend::OpenAi);
        assert!(!force);
    }

    #[test]
    fn index_with_all_flags() {
        let cli = Cli::try_parse_from([
            "attack-rag",
            "index",
            "-t",
            "data/mobile.json",
            "-v",
            "/tmp/store",
            "-c",
            "mobile",
            "-e",
            "local",
            "--force",
        ])
        .expect("should parse");

        let Commands::Index {
            techniques,
            store,
            embeddings,
            force,
        } = cli.command
        else {
            panic!("expected index command");
        };
        assert_eq!(techniques, Some(PathBuf::from("data/mobile.json")));
        assert_eq!(store.vector_store, Some(PathBuf::from("/tmp/store")));
        assert_eq!(store.collection.as_deref(), Some("mobile"));
        assert_eq!(embeddings, EmbeddingBackend::Local);
        assert!(force);
    }

    #[test]
    fn chat_flags() {
        let cli = Cli::try_parse_from([
            "attack-rag",
            "chat",
            "-n",
            "10",
            "-d",
            "--thread",
            "case-1",
        ])
        .expect("should parse");
        assert!(cli.debug());

        let Commands::Chat {
            num_similar,
            thread,
            embeddings,
            ..
        } = cli.command
        else {
            panic!("expected chat command");
        };
        assert_eq!(num_similar, Some(10));
        assert_eq!(thread.as_deref(), Some("case-1"));
        assert_eq!(embeddings, EmbeddingBackend::OpenAi);
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["attack-rag", "status", "--config-dir", "/tmp/cfg"])
            .expect("should parse");
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/cfg")));
        assert!(!cli.debug());
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["attack-rag", "config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let error = Cli::try_parse_from(["attack-rag", "index", "-e", "cohere"])
            .err()
            .expect("unknown backend should fail");
        assert_eq!(error.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn invalid_command() {
        let error = Cli::try_parse_from(["attack-rag", "invalid"])
            .err()
            .expect("unknown command should fail");
        assert_eq!(error.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
