// Conversation transcript with a bounded history window and JSON checkpoints


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{RagError, Result};

/// System turn every transcript starts with
pub const SESSION_PREAMBLE: &str = "You are a MITRE ATT&CK expert assistant.";

const MAX_THREAD_ID_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "System"),
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered turns of one session. System turns are always kept; user and
/// assistant turns beyond `max_history_turns` are dropped oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
    max_history_turns: usize,
}

impl Transcript {
    #[inline]
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            turns: vec![Turn::new(Role::System, SESSION_PREAMBLE)],
            max_history_turns: max_history_turns.max(1),
        }
    }

    /// Rebuild from stored turns, restoring the preamble if it is missing
    #[inline]
    pub fn from_turns(turns: Vec<Turn>, max_history_turns: usize) -> Self {
        let mut transcript = Self {
            turns,
            max_history_turns: max_history_turns.max(1),
        };
        let has_preamble = transcript
            .turns
            .first()
            .is_some_and(|turn| turn.role == Role::System);
        if !has_preamble {
            transcript
                .turns
                .insert(0, Turn::new(Role::System, SESSION_PREAMBLE));
        }
        transcript.enforce_window();
        transcript
    }

    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// User and assistant turns in order
    #[inline]
    pub fn conversation(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|turn| turn.role != Role::System)
    }

    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn max_history_turns(&self) -> usize {
        self.max_history_turns
    }

    #[inline]
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
        self.enforce_window();
    }

    fn enforce_window(&mut self) {
        let excess = self
            .conversation()
            .count()
            .saturating_sub(self.max_history_turns);
        if excess == 0 {
            return;
        }

        debug!("Dropping {} oldest turns from transcript", excess);
        let mut dropped = 0;
        self.turns.retain(|turn| {
            if turn.role != Role::System && dropped < excess {
                dropped += 1;
                false
            } else {
                true
            }
        });
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    thread_id: String,
    updated_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

/// Per-thread transcript files under one directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<thread_id>.json`; ids are limited to ASCII letters, digits,
    /// '-' and '_'
    #[inline]
    pub fn path_for(&self, thread_id: &str) -> Result<PathBuf> {
        let valid = !thread_id.is_empty()
            && thread_id.len() <= MAX_THREAD_ID_LENGTH
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RagError::Config(format!(
                "Invalid thread id '{}': use up to {} letters, digits, '-' or '_'",
                thread_id, MAX_THREAD_ID_LENGTH
            )));
        }
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }

    /// Load a thread, or `None` if it was never saved
    #[inline]
    pub async fn load(&self, thread_id: &str, max_history_turns: usize) -> Result<Option<Transcript>> {
        let path = self.path_for(thread_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&content).map_err(|e| {
            RagError::Data(format!("Corrupt checkpoint {}: {}", path.display(), e))
        })?;
        info!(
            "Resumed thread {} with {} turns",
            thread_id,
            checkpoint.turns.len()
        );
        Ok(Some(Transcript::from_turns(
            checkpoint.turns,
            max_history_turns,
        )))
    }

    /// Write the transcript atomically (temp file, then rename)
    #[inline]
    pub async fn save(&self, thread_id: &str, transcript: &Transcript) -> Result<()> {
        let path = self.path_for(thread_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            updated_at: Utc::now(),
            turns: transcript.turns().to_vec(),
        };
        let json = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize checkpoint: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Checkpointed thread {} to {}", thread_id, path.display());
        Ok(())
    }
}
