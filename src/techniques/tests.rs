use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

const SAMPLE: &str = r#"[
  {
    "id": "T1059",
    "name": "Command and Scripting Interpreter",
    "description": "Adversaries may abuse command and script interpreters to execute commands, scripts, or binaries.",
    "tactics": ["execution"],
    "platforms": ["Linux", "macOS", "Windows"],
    "datasources": ["Command: Command Execution", "Process: Process Creation"],
    "permissions_required": ["User"],
    "url": "https://attack.mitre.org/techniques/T1059",
    "detection": "Monitor command-line arguments for script execution.",
    "mitigations": [
      {"name": "Execution Prevention", "description": "Use application control where appropriate."}
    ],
    "x_unknown_field": true
  },
  {
    "id": "T1003",
    "name": "OS Credential Dumping",
    "description": "",
    "mitigation_methods": [
      {"name": "Privileged Account Management", "description": "Limit credential overlap."}
    ]
  }
]"#;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("should create temp file");
    file.write_all(content.as_bytes())
        .expect("should write temp file");
    file
}

#[test]
fn parses_full_and_sparse_records() {
    let records = parse_techniques(SAMPLE).expect("sample should parse");
    assert_eq!(records.len(), 2);

    let first = &records[0].metadata;
    assert_eq!(first.technique_id, "T1059");
    assert_eq!(first.tactics, vec!["execution"]);
    assert_eq!(first.platforms.len(), 3);
    assert_eq!(first.permissions_required, vec!["User"]);
    assert_eq!(
        first.detection.as_deref(),
        Some("Monitor command-line arguments for script execution.")
    );
    assert_eq!(first.mitigations[0].name, "Execution Prevention");

    let second = &records[1].metadata;
    assert_eq!(second.technique_id, "T1003");
    assert!(second.tactics.is_empty());
    assert_eq!(second.detection, None);
    assert_eq!(second.url, "");
    assert_eq!(
        second.mitigations,
        vec![Mitigation {
            name: "Privileged Account Management".to_string(),
            description: "Limit credential overlap.".to_string(),
        }]
    );
}

#[test]
fn missing_id_names_the_record() {
    let json = r#"[{"id": "T1001", "name": "Data Obfuscation"}, {"name": "No id here"}]"#;

    let error = parse_techniques(json).expect_err("missing id should fail");
    match error {
        RagError::Data(message) => {
            assert!(message.contains("#2"), "message was: {}", message);
            assert!(message.contains("'id'"));
        }
        other => panic!("expected data error, got {:?}", other),
    }
}

#[test]
fn blank_id_is_treated_as_missing() {
    let json = r#"[{"id": "   ", "name": "Blank"}]"#;
    assert!(matches!(parse_techniques(json), Err(RagError::Data(_))));
}

#[test]
fn malformed_json_is_a_data_error() {
    let file = write_temp("[{\"id\": \"T1059\",");
    let error = load_techniques(file.path()).expect_err("malformed JSON should fail");
    match error {
        RagError::Data(message) => assert!(message.contains("Malformed techniques JSON")),
        other => panic!("expected data error, got {:?}", other),
    }
}

#[test]
fn missing_file_is_a_config_error() {
    let result = load_techniques(Path::new("/definitely/not/here/techniques.json"));
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[test]
fn load_from_disk() {
    let file = write_temp(SAMPLE);
    let records = load_techniques(file.path()).expect("sample file should load");
    assert_eq!(records.len(), 2);
}

#[test]
fn every_record_contributes_a_chunk() {
    let records = parse_techniques(SAMPLE).expect("sample should parse");
    let chunks = build_chunks(&records, &ChunkingConfig::default());

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].metadata.technique_id, "T1059");
    assert!(chunks[0].content.starts_with("Adversaries may abuse"));
    assert_eq!(chunks[1].metadata.technique_id, "T1003");
    assert_eq!(chunks[1].content, "OS Credential Dumping");
}

#[test]
fn long_descriptions_are_split_with_indices() {
    let description = "Adversaries may modify registry run keys to persist. ".repeat(30);
    let json = serde_json::json!([{
        "id": "T1547.001",
        "name": "Registry Run Keys / Startup Folder",
        "description": description,
        "tactics": ["persistence", "privilege-escalation"]
    }])
    .to_string();
    let records = parse_techniques(&json).expect("record should parse");

    let chunks = build_chunks(
        &records,
        &ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 20,
        },
    );

    assert!(chunks.len() > 1);
    for (expected_index, chunk) in (0_u32..).zip(&chunks) {
        assert_eq!(chunk.chunk_index, expected_index);
        assert_eq!(chunk.metadata.technique_id, "T1547.001");
        assert_eq!(
            chunk.metadata.tactics,
            vec!["persistence", "privilege-escalation"]
        );
    }
}
