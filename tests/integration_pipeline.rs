#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for indexing and chatting over a real LanceDB collection
//!
//! Embeddings and the chat model are replaced by deterministic in-process
//! implementations so that no network access is needed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use attack_rag::RagError;
use attack_rag::app::AppContext;
use attack_rag::chat::session::MODEL_ERROR_PREFIX;
use attack_rag::chat::{
    ChatMessage, ChatModel, ChatSession, CheckpointStore, Role, SessionOptions, TurnOutcome,
    spawn_line_reader,
};
use attack_rag::config::Config;
use attack_rag::database::{LanceStore, VectorIndex};
use attack_rag::embeddings::Embedder;
use tempfile::TempDir;

const VOCABULARY: [&str; 6] = ["script", "command", "credential", "password", "registry", "execut"];

/// Bag-of-words embedder over a tiny security vocabulary
struct VocabularyEmbedder;

impl Embedder for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary"
    }

    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32 + 0.05)
                    .collect()
            })
            .collect())
    }
}

#[derive(Default)]
struct ScriptedModel {
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("Client error: HTTP 401 (authentication failed, check OPENAI_API_KEY)");
        }
        let prompt = messages
            .first()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push(prompt);
        Ok("1. Relevant technique: T1059 (execution).".to_string())
    }
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/techniques_sample.json")
}

fn single_technique_file(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("t1059.json");
    std::fs::write(
        &path,
        r#"[{
            "id": "T1059",
            "name": "Command and Scripting Interpreter",
            "description": "Adversaries may abuse command and script interpreters to execute commands, scripts, or binaries.",
            "tactics": ["execution"],
            "url": "https://attack.mitre.org/techniques/T1059"
        }]"#,
    )
    .expect("should write techniques file");
    path
}

async fn context_in(temp_dir: &TempDir) -> AppContext {
    let mut config = Config::default();
    config.store.path = temp_dir.path().join("vector_store");
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;

    let store = LanceStore::connect(&config.store.path, &config.store.collection)
        .await
        .expect("should open LanceDB store");
    AppContext::new(config, Arc::new(VocabularyEmbedder), Arc::new(store))
}

#[tokio::test]
async fn indexed_technique_surfaces_in_context() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let context = context_in(&temp_dir).await;
    let file = single_technique_file(&temp_dir);

    let stats = context
        .indexer()
        .with_progress(false)
        .index_file(&file, false)
        .await
        .expect("indexing should succeed");
    assert_eq!(stats.records_loaded, 1);
    assert!(stats.entries_written >= 1);

    let rendered = context
        .retriever()
        .build_context("how do attackers run scripts", 6)
        .await
        .expect("retrieval should succeed");

    assert!(rendered.contains("T1059"));
    assert!(rendered.contains("Tactics: execution"));
    assert!(rendered.contains("Detection: Not available"));
    assert!(rendered.contains("- Not available"));
}

#[tokio::test]
async fn retrieval_respects_k() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let context = context_in(&temp_dir).await;

    let stats = context
        .indexer()
        .with_progress(false)
        .index_file(&fixture(), false)
        .await
        .expect("indexing should succeed");
    assert_eq!(stats.records_loaded, 3);
    assert!(stats.chunks_created > 3);

    let retriever = context.retriever();
    let top = retriever
        .retrieve("how do attackers run scripts", 3)
        .await
        .expect("retrieval should succeed");
    assert!(top.len() <= 3);
    assert_eq!(top[0].metadata.technique_id, "T1059");

    let none = retriever
        .build_context("how do attackers run scripts", 0)
        .await
        .expect("k = 0 should succeed");
    assert_eq!(none, "");

    let pinned = retriever
        .retrieve("is T1112 relevant to script execution?", 2)
        .await
        .expect("retrieval should succeed");
    assert_eq!(pinned[0].metadata.technique_id, "T1112");
}

#[tokio::test]
async fn existing_collection_is_left_untouched_without_force() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let context = context_in(&temp_dir).await;
    let indexer = context.indexer().with_progress(false);

    let first = indexer
        .index_file(&fixture(), false)
        .await
        .expect("first run should succeed");
    let count = context.store.count_entries().await.expect("should count");
    assert_eq!(count, first.entries_written);

    let error = indexer
        .index_file(&single_technique_file(&temp_dir), false)
        .await
        .expect_err("second run without force should fail");
    assert!(matches!(error, RagError::CollectionExists { .. }));
    assert!(error.to_string().contains("--force"));
    assert_eq!(
        context.store.count_entries().await.expect("should count"),
        count
    );

    let forced = indexer
        .index_file(&single_technique_file(&temp_dir), true)
        .await
        .expect("forced run should succeed");
    assert_eq!(
        context.store.count_entries().await.expect("should count"),
        forced.entries_written
    );
}

#[tokio::test]
async fn model_failure_keeps_the_session_alive() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let context = context_in(&temp_dir).await;
    context
        .indexer()
        .with_progress(false)
        .index_file(&fixture(), false)
        .await
        .expect("indexing should succeed");

    let mut session = ChatSession::new(
        context.retriever(),
        Arc::new(ScriptedModel {
            fail: true,
            ..ScriptedModel::default()
        }),
        SessionOptions::default(),
    );

    let outcome = session.handle_input("how do attackers run scripts").await;
    let TurnOutcome::ModelFailed(message) = outcome else {
        panic!("expected a model failure, got {:?}", outcome);
    };
    assert!(message.starts_with(MODEL_ERROR_PREFIX));

    let turns = session.transcript().turns();
    let user = &turns[turns.len() - 2];
    let assistant = &turns[turns.len() - 1];
    assert_eq!(user.role, Role::User);
    assert_eq!(user.content, "how do attackers run scripts");
    assert_eq!(assistant.role, Role::Assistant);
    assert!(assistant.content.starts_with(MODEL_ERROR_PREFIX));

    let next = session.handle_input("what about credential dumping?").await;
    assert!(matches!(next, TurnOutcome::ModelFailed(_)));
    assert_eq!(session.transcript().conversation().count(), 4);
}

#[tokio::test]
async fn chat_over_indexed_collection_with_checkpoint() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let context = context_in(&temp_dir).await;
    context
        .indexer()
        .with_progress(false)
        .index_file(&fixture(), false)
        .await
        .expect("indexing should succeed");

    let threads = CheckpointStore::new(temp_dir.path().join("threads"));
    let model = Arc::new(ScriptedModel::default());
    let mut session = ChatSession::new(
        context.retriever(),
        Arc::clone(&model) as Arc<dyn ChatModel>,
        SessionOptions::from_config(&context.config.chat, 2),
    )
    .with_checkpoint(threads.clone(), "investigation")
    .await
    .expect("should open thread");

    let input = spawn_line_reader(&b"How do attackers run scripts?\n:terminate\n"[..]);
    let mut output = Vec::new();
    session
        .run(input, &mut output, std::future::pending())
        .await
        .expect("session should run");

    let prompts = model
        .prompts
        .lock()
        .expect("lock should not be poisoned")
        .clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("(ID: T1059)"));
    assert!(prompts[0].ends_with("Question: How do attackers run scripts?"));

    let resumed = threads
        .load("investigation", 20)
        .await
        .expect("should load thread")
        .expect("thread should exist");
    assert_eq!(resumed.conversation().count(), 2);
}
