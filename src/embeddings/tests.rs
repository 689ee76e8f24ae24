use super::*;

#[test]
fn openai_without_key_falls_back_to_local() {
    let config = Config::default();
    assert_eq!(
        resolve_backend(&config, EmbeddingBackend::OpenAi),
        EmbeddingBackend::Local
    );

    let embedder =
        select_embedder(&config, EmbeddingBackend::OpenAi).expect("should select an embedder");
    assert_eq!(embedder.model_name(), "nomic-embed-text:latest");
}

#[test]
fn openai_with_key_is_kept() {
    let mut config = Config::default();
    config.openai.api_key = Some("sk-test".to_string());

    assert_eq!(
        resolve_backend(&config, EmbeddingBackend::OpenAi),
        EmbeddingBackend::OpenAi
    );
    let embedder =
        select_embedder(&config, EmbeddingBackend::OpenAi).expect("should select an embedder");
    assert_eq!(embedder.model_name(), "text-embedding-3-small");
}

#[test]
fn local_is_always_local() {
    let mut config = Config::default();
    config.openai.api_key = Some("sk-test".to_string());
    assert_eq!(
        resolve_backend(&config, EmbeddingBackend::Local),
        EmbeddingBackend::Local
    );
}

#[test]
fn backend_names() {
    assert_eq!(EmbeddingBackend::OpenAi.to_string(), "openai");
    assert_eq!(EmbeddingBackend::Local.to_string(), "local");
    assert_eq!(
        EmbeddingBackend::from_str("openai", true).expect("should parse"),
        EmbeddingBackend::OpenAi
    );
}
