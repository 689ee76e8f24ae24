use super::*;

#[test]
fn entries_from_chunks_get_unique_ids() {
    let chunk = TechniqueChunk {
        content: "Adversaries may abuse PowerShell.".to_string(),
        chunk_index: 3,
        metadata: TechniqueMetadata {
            technique_id: "T1059.001".to_string(),
            name: "PowerShell".to_string(),
            ..TechniqueMetadata::default()
        },
    };

    let first = VectorEntry::from_chunk(chunk.clone(), vec![0.1, 0.2]);
    let second = VectorEntry::from_chunk(chunk, vec![0.1, 0.2]);

    assert_ne!(first.id, second.id);
    assert!(uuid::Uuid::parse_str(&first.id).is_ok());
    assert_eq!(first.chunk_index, 3);
    assert_eq!(first.content, "Adversaries may abuse PowerShell.");
    assert_eq!(first.metadata.technique_id, "T1059.001");
}
