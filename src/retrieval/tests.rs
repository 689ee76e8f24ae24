use super::*;
use crate::database::{MemoryStore, VectorEntry};
use crate::techniques::TechniqueMetadata;
use std::sync::atomic::{AtomicUsize, Ordering};

const KEYWORDS: [&str; 3] = ["script", "credential", "registry"];

/// Bag-of-keywords embedder with a call counter
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }

    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|keyword| lower.matches(keyword).count() as f32 + 0.01)
                    .collect()
            })
            .collect())
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn embed_documents(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("rate limited")
    }
}

fn entry(id: &str, technique_id: &str, tactic: &str, content: &str, vector: Vec<f32>) -> VectorEntry {
    VectorEntry {
        id: id.to_string(),
        vector,
        content: content.to_string(),
        chunk_index: 0,
        metadata: TechniqueMetadata {
            technique_id: technique_id.to_string(),
            name: format!("Technique {}", technique_id),
            tactics: vec![tactic.to_string()],
            ..TechniqueMetadata::default()
        },
        created_at: chrono::Utc::now(),
    }
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new("techniques"));
    store
        .add_entries(&[
            entry("a", "T1059", "execution", "Run a script interpreter", vec![1.0, 0.0, 0.0]),
            entry("b", "T1059", "execution", "More script abuse", vec![0.9, 0.1, 0.0]),
            entry("c", "T1003", "credential-access", "Dump credential stores", vec![0.0, 1.0, 0.0]),
            entry("d", "T1112", "defense-evasion", "Modify the registry", vec![0.0, 0.0, 1.0]),
        ])
        .await
        .expect("should seed store");
    store
}

#[tokio::test]
async fn zero_k_touches_nothing() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let store = Arc::new(MemoryStore::new("missing"));
    let retriever = Retriever::new(
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        store as Arc<dyn VectorIndex>,
    );

    let results = retriever
        .retrieve("how do attackers run scripts", 0)
        .await
        .expect("k = 0 should succeed even without a collection");
    assert!(results.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

    let context = retriever
        .build_context("anything", 0)
        .await
        .expect("should render");
    assert_eq!(context, "");
}

#[tokio::test]
async fn results_are_bounded_by_k() {
    let retriever = Retriever::new(Arc::new(KeywordEmbedder::default()), seeded_store().await);

    let results = retriever
        .retrieve("how do attackers run scripts", 3)
        .await
        .expect("should retrieve");
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].metadata.technique_id, "T1059");

    let all = retriever
        .retrieve("how do attackers run scripts", 50)
        .await
        .expect("should retrieve");
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn technique_id_in_query_is_pinned_first() {
    let retriever = Retriever::new(Arc::new(KeywordEmbedder::default()), seeded_store().await);

    let results = retriever
        .retrieve("does t1112 relate to script execution?", 2)
        .await
        .expect("should retrieve");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].metadata.technique_id, "T1112");
    assert_eq!(results[1].metadata.technique_id, "T1059");
}

#[tokio::test]
async fn pinned_and_general_results_are_deduplicated() {
    let retriever = Retriever::new(Arc::new(KeywordEmbedder::default()), seeded_store().await);

    let results = retriever
        .retrieve("T1059 script details", 4)
        .await
        .expect("should retrieve");

    let ids: Vec<&str> = results.iter().map(|r| r.entry_id.as_str()).collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids.iter().unique().count(), 4);
    assert!(ids[..2].contains(&"a"));
    assert!(ids[..2].contains(&"b"));
}

#[tokio::test]
async fn context_surfaces_id_and_tactics() {
    let retriever = Retriever::new(Arc::new(KeywordEmbedder::default()), seeded_store().await);

    let context = retriever
        .build_context("how do attackers run scripts", 1)
        .await
        .expect("should render");

    assert!(context.contains("(ID: T1059)"));
    assert!(context.contains("Tactics: execution"));
    assert!(!context.contains("T1003"));
}

#[tokio::test]
async fn embedding_errors_propagate() {
    let retriever = Retriever::new(Arc::new(FailingEmbedder), seeded_store().await);

    let error = retriever
        .retrieve("how do attackers run scripts", 3)
        .await
        .expect_err("embedding failure should surface");
    assert!(matches!(error, RagError::Embedding(ref msg) if msg.contains("rate limited")));
}

#[tokio::test]
async fn missing_collection_is_a_database_error() {
    let retriever = Retriever::new(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(MemoryStore::new("missing")),
    );

    let error = retriever
        .retrieve("how do attackers run scripts", 3)
        .await
        .expect_err("search on a missing collection should fail");
    assert!(matches!(error, RagError::Database(_)));
}
