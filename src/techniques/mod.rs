// ATT&CK technique records: JSON ingestion and chunk construction

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::embeddings::chunking::{ChunkingConfig, split_text};
use crate::{RagError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mitigation {
    pub name: String,
    pub description: String,
}

/// Technique object as it appears in the source JSON. Every field is
/// optional here so that missing data can be reported precisely.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawTechnique {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    tactics: Vec<String>,
    platforms: Vec<String>,
    datasources: Vec<String>,
    permissions_required: Vec<String>,
    url: Option<String>,
    detection: Option<String>,
    #[serde(alias = "mitigation_methods")]
    mitigations: Vec<Mitigation>,
}

/// A validated technique record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechniqueRecord {
    pub description: String,
    pub metadata: TechniqueMetadata,
}

/// Structured technique fields copied onto every chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueMetadata {
    pub technique_id: String,
    pub name: String,
    pub url: String,
    pub tactics: Vec<String>,
    pub platforms: Vec<String>,
    pub datasources: Vec<String>,
    pub permissions_required: Vec<String>,
    pub detection: Option<String>,
    pub mitigations: Vec<Mitigation>,
}

/// A span of a technique description ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechniqueChunk {
    pub content: String,
    pub chunk_index: u32,
    pub metadata: TechniqueMetadata,
}

impl RawTechnique {
    fn into_record(self, position: usize) -> Result<TechniqueRecord> {
        let technique_id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                RagError::Data(format!(
                    "Technique record #{} is missing required field 'id'",
                    position
                ))
            })?;

        let detection = self
            .detection
            .map(|detection| detection.trim().to_string())
            .filter(|detection| !detection.is_empty());

        Ok(TechniqueRecord {
            description: self.description.unwrap_or_default(),
            metadata: TechniqueMetadata {
                technique_id,
                name: self.name.unwrap_or_default(),
                url: self.url.unwrap_or_default(),
                tactics: self.tactics,
                platforms: self.platforms,
                datasources: self.datasources,
                permissions_required: self.permissions_required,
                detection,
                mitigations: self.mitigations,
            },
        })
    }
}

/// Load and validate a JSON array of technique records. Positions in error
/// messages are 1-based.
#[inline]
pub fn load_techniques(path: &Path) -> Result<Vec<TechniqueRecord>> {
    if !path.is_file() {
        return Err(RagError::Config(format!(
            "Techniques file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    let records = parse_techniques(&content).map_err(|e| match e {
        RagError::Data(message) => RagError::Data(format!("{} in {}", message, path.display())),
        other => other,
    })?;

    info!(
        "Loaded {} technique records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Parse technique records from JSON text
#[inline]
pub fn parse_techniques(json: &str) -> Result<Vec<TechniqueRecord>> {
    let raw: Vec<RawTechnique> = serde_json::from_str(json)
        .map_err(|e| RagError::Data(format!("Malformed techniques JSON: {}", e)))?;

    raw.into_iter()
        .enumerate()
        .map(|(idx, technique)| technique.into_record(idx + 1))
        .collect()
}

/// Split every record's description into chunks. A record without a
/// description yields a single chunk holding the technique name.
#[inline]
pub fn build_chunks(records: &[TechniqueRecord], config: &ChunkingConfig) -> Vec<TechniqueChunk> {
    let mut chunks = Vec::new();

    for record in records {
        let mut pieces = split_text(&record.description, config);
        if pieces.is_empty() {
            let fallback = if record.metadata.name.trim().is_empty() {
                record.metadata.technique_id.clone()
            } else {
                record.metadata.name.trim().to_string()
            };
            pieces.push(fallback);
        }

        debug!(
            "Technique {} produced {} chunks",
            record.metadata.technique_id,
            pieces.len()
        );

        chunks.extend(
            pieces
                .into_iter()
                .zip(0_u32..)
                .map(|(content, chunk_index)| TechniqueChunk {
                    content,
                    chunk_index,
                    metadata: record.metadata.clone(),
                }),
        );
    }

    chunks
}
