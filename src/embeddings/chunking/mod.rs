
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Separators tried in order: paragraphs, lines, words, then single characters
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Configuration for description chunking, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 64,
        }
    }
}

impl ChunkingConfig {
    /// Smaller chunks suited to local embedding models
    #[inline]
    pub const fn local_default() -> Self {
        Self {
            chunk_size: 256,
            chunk_overlap: 64,
        }
    }
}

/// Split text into chunks of at most `chunk_size` characters, preferring
/// paragraph, then line, then word boundaries
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunks = split_recursive(text, &DEFAULT_SEPARATORS, config);

    debug!(
        "Split {} characters into {} chunks (size {}, overlap {})",
        char_len(text),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    chunks
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    // The empty separator always matches, so a separator is always found
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let remaining = separators.get(position + 1..).unwrap_or(&[]);

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in text.split(separator).filter(|piece| !piece.is_empty()) {
        if char_len(piece) < config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_splits(&pending, separator, config));
            pending.clear();
        }

        if remaining.is_empty() {
            chunks.push(piece.trim().to_string());
        } else {
            chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_splits(&pending, separator, config));
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

/// Greedily pack pieces into chunks, carrying the tail of each chunk into the
/// next one up to `chunk_overlap` characters
fn merge_splits(pieces: &[&str], separator: &str, config: &ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0_usize;

    for &piece in pieces {
        let piece_len = char_len(piece);
        let joined_len = |window: &VecDeque<&str>, total: usize| {
            total + piece_len + if window.is_empty() { 0 } else { separator_len }
        };

        if joined_len(&window, total) > config.chunk_size && !window.is_empty() {
            push_joined(&mut chunks, &window, separator);

            while total > config.chunk_overlap
                || (joined_len(&window, total) > config.chunk_size && total > 0)
            {
                let Some(front) = window.pop_front() else {
                    break;
                };
                let dropped = char_len(front) + if window.is_empty() { 0 } else { separator_len };
                total = total.saturating_sub(dropped);
            }
        }

        if !window.is_empty() {
            total += separator_len;
        }
        window.push_back(piece);
        total += piece_len;
    }

    push_joined(&mut chunks, &window, separator);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
