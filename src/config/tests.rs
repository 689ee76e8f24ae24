use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.retrieval.num_similar, 6);
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_dir = temp_dir.path().join("nested").join("attack-rag");

    let mut original = Config {
        base_dir: config_dir.clone(),
        ..Config::default()
    };
    original.store.collection = "mobile_techniques".to_string();
    original.chunking.chunk_size = 300;
    original.local_chunking.chunk_size = 200;
    original.chat.max_history_turns = 8;

    original.save().expect("should save config");
    assert!(config_dir.join("config.toml").exists());

    let loaded = Config::load(&config_dir).expect("should load saved config");
    assert_eq!(original, loaded);
}

#[test]
fn save_rejects_invalid_config() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.chunking.chunk_overlap = 5000;

    assert!(config.save().is_err());
    assert!(!temp_dir.path().join("config.toml").exists());
}

#[test]
fn invalid_toml_is_reported() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[store\ncollection = \"x\"",
    )
    .expect("should write config");

    let error = Config::load(temp_dir.path()).expect_err("broken toml should fail");
    assert!(format!("{:#}", error).contains("Failed to parse config file"));
}

#[test]
fn invalid_values_fail_validation_on_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
    )
    .expect("should write config");

    let error = Config::load(temp_dir.path()).expect_err("invalid overlap should fail");
    assert!(format!("{:#}", error).contains("Chunk overlap"));
}

#[test]
fn resolve_config_dir_prefers_override() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let resolved = resolve_config_dir(Some(temp_dir.path())).expect("should resolve");
    assert_eq!(resolved, temp_dir.path());
}
