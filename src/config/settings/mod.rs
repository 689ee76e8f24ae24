
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chat::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::embeddings::EmbeddingBackend;
use crate::embeddings::chunking::ChunkingConfig;

const APP_DIR_NAME: &str = "attack-rag";
const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_NUM_SIMILAR: usize = 100;

pub const DEFAULT_EXIT_COMMANDS: [&str; 4] = [":exit", ":quit", ":terminate", ":salir"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Chunking for hosted embeddings
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Chunking for the local (Ollama) backend
    #[serde(default = "ChunkingConfig::local_default")]
    pub local_chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
            store: StoreConfig::default(),
            chunking: ChunkingConfig::default(),
            local_chunking: ChunkingConfig::local_default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    /// Only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub batch_size: u32,
}

impl Default for OpenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout_secs: 60,
            batch_size: 100,
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Vector store directory; relative paths resolve against the working directory
    pub path: PathBuf,
    pub collection: String,
    pub techniques_file: PathBuf,
}

impl Default for StoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            path: PathBuf::from("vector_store_mitre"),
            collection: "mitre_attack_techniques".to_string(),
            techniques_file: PathBuf::from("data/techniques_enterprise_attack.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub num_similar: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self { num_similar: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    pub max_history_turns: usize,
    pub turn_timeout_secs: u64,
    pub system_prompt: String,
    pub exit_commands: Vec<String>,
}

impl Default for ChatConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_history_turns: 20,
            turn_timeout_secs: 120,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            exit_commands: DEFAULT_EXIT_COMMANDS
                .iter()
                .map(|cmd| (*cmd).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    InvalidChunkOverlap(usize, usize),
    #[error("Invalid number of similar documents: {0} (must be between 0 and 100)")]
    InvalidNumSimilar(usize),
    #[error("Invalid history window: {0} (must be at least 1)")]
    InvalidHistoryWindow(usize),
    #[error("Invalid collection name: '{0}' (use letters, digits, '_' or '-')")]
    InvalidCollectionName(String),
    #[error("Invalid path: {0} (cannot be empty)")]
    InvalidPath(String),
    #[error("Exit command list cannot be empty")]
    NoExitCommands,
    #[error("Exit commands cannot be blank")]
    BlankExitCommand,
    #[error("OPENAI_API_KEY is not set. Export it or add it to a .env file")]
    MissingApiKey,
    #[error("Invalid value '{value}' for environment variable {var}")]
    InvalidEnvOverride { var: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `<user config dir>/attack-rag`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load the file then apply environment overrides
    #[inline]
    pub fn load_with_env<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load(config_dir)?;
        config
            .apply_overrides(|var| std::env::var(var).ok())
            .context("Invalid environment override")?;
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Apply `OPENAI_*`, store, chunking and retrieval overrides. `lookup`
    /// resolves a variable name to its value.
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(key) = read("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(base_url) = read("OPENAI_BASE_URL") {
            self.openai.base_url = base_url;
        }
        if let Some(model) = read("CHAT_MODEL") {
            self.openai.chat_model = model;
        }
        if let Some(model) = read("EMBEDDING_MODEL") {
            self.openai.embedding_model = model;
        }
        if let Some(path) = read("VECTOR_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(collection) = read("COLLECTION_NAME") {
            self.store.collection = collection;
        }
        if let Some(value) = read("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_override("CHUNK_SIZE", value)?;
        }
        if let Some(value) = read("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_override("CHUNK_OVERLAP", value)?;
        }
        if let Some(value) = read("NUM_SIMILAR_DOCS") {
            self.retrieval.num_similar = parse_override("NUM_SIMILAR_DOCS", value)?;
        }

        Ok(())
    }

    /// Chunk sizes used when indexing with `backend`
    #[inline]
    pub fn chunking_for(&self, backend: EmbeddingBackend) -> ChunkingConfig {
        match backend {
            EmbeddingBackend::OpenAi => self.chunking,
            EmbeddingBackend::Local => self.local_chunking,
        }
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory holding checkpointed chat threads
    #[inline]
    pub fn threads_dir(&self) -> PathBuf {
        self.base_dir().join("threads")
    }

    #[inline]
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai
            .api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;
        self.ollama.validate()?;
        self.store.validate()?;
        validate_chunking(&self.chunking)?;
        validate_chunking(&self.local_chunking)?;

        if self.retrieval.num_similar > MAX_NUM_SIMILAR {
            return Err(ConfigError::InvalidNumSimilar(self.retrieval.num_similar));
        }

        self.chat.validate()?;
        Ok(())
    }
}

#[inline]
pub fn validate_chunking(config: &ChunkingConfig) -> Result<(), ConfigError> {
    if config.chunk_size == 0 {
        return Err(ConfigError::InvalidChunkSize(config.chunk_size));
    }
    if config.chunk_overlap >= config.chunk_size {
        return Err(ConfigError::InvalidChunkOverlap(
            config.chunk_overlap,
            config.chunk_size,
        ));
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(var: &str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            var: var.to_string(),
            value,
        })
}

fn validate_batch_size(batch_size: u32) -> Result<(), ConfigError> {
    if batch_size == 0 || batch_size > 2048 {
        return Err(ConfigError::InvalidBatchSize(batch_size));
    }
    Ok(())
}

fn validate_timeout(timeout_secs: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&timeout_secs) {
        return Err(ConfigError::InvalidTimeout(timeout_secs));
    }
    Ok(())
}

impl OpenAiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        validate_timeout(self.timeout_secs)?;
        validate_batch_size(self.batch_size)
    }

    #[inline]
    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let candidate = Self {
            base_url: base_url.clone(),
            ..self.clone()
        };
        candidate.validate()?;
        self.base_url = base_url;
        Ok(())
    }

    #[inline]
    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_timeout_secs(&mut self, timeout_secs: u64) -> Result<(), ConfigError> {
        validate_timeout(timeout_secs)?;
        self.timeout_secs = timeout_secs;
        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        validate_batch_size(self.batch_size)
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let candidate = Self {
            host: host.clone(),
            ..self.clone()
        };
        candidate.url()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        validate_batch_size(batch_size)?;
        self.batch_size = batch_size;
        Ok(())
    }
}

impl StoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPath("vector store path".to_string()));
        }
        if self.techniques_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPath("techniques file".to_string()));
        }
        validate_collection_name(&self.collection)
    }

    #[inline]
    pub fn set_collection(&mut self, collection: String) -> Result<(), ConfigError> {
        validate_collection_name(&collection)?;
        self.collection = collection;
        Ok(())
    }
}

/// Collection names become LanceDB table names
#[inline]
pub fn validate_collection_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidCollectionName(name.to_string()))
    }
}

impl ChatConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_turns == 0 {
            return Err(ConfigError::InvalidHistoryWindow(self.max_history_turns));
        }
        validate_timeout(self.turn_timeout_secs)?;
        if self.exit_commands.is_empty() {
            return Err(ConfigError::NoExitCommands);
        }
        if self.exit_commands.iter().any(|cmd| cmd.trim().is_empty()) {
            return Err(ConfigError::BlankExitCommand);
        }
        Ok(())
    }
}
