use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::provider::ChatMessage;

/// Who said a stored message. A "system" role also exists on the wire as the
/// persona prefix, but it is assembled at send time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One stored message in a conversation log.
///
/// `time` is informational only; it is recorded when the turn is appended
/// and never sent to the completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub time: String,
}

impl Turn {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// A named bot and the persona instruction sent as the system message on
/// every request. Created at startup, never mutated; the name doubles as
/// the stem of the conversation file.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub name: String,
    pub persona: String,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
        }
    }
}

/// Durable store for one bot's conversation log.
///
/// The log lives in memory as an ordered `Vec<Turn>`; `persist` rewrites the
/// whole JSON file. Read-path failures (missing file, unparsable content)
/// degrade to an empty log, so only `persist` can actually fail.
pub struct ConversationStore {
    path: PathBuf,
    turns: Vec<Turn>,
}

impl ConversationStore {
    /// Load the conversation log for `name` from `dir`, or start empty.
    pub fn load(dir: &Path, name: &str) -> Self {
        let path = dir.join(format!("{name}.json"));
        let turns = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<Turn>>(&raw) {
                Ok(turns) => {
                    tracing::debug!(count = turns.len(), "loaded conversation log");
                    turns
                }
                Err(err) => {
                    // Corrupt file: reset memory, overwritten on next persist
                    tracing::warn!(
                        path = %path.display(),
                        %err,
                        "conversation log unparsable, resetting memory"
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, turns }
    }

    /// Append one turn to the in-memory log. Does not persist, and does not
    /// validate role alternation.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Write the full log to the conversation file, replacing it entirely.
    ///
    /// Writes to a sibling temp file and renames over the target so an
    /// interrupted save never leaves a half-written file. On failure the
    /// in-memory log is untouched and retrying is safe.
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.turns)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Empty the in-memory log. With `purge_file`, also remove the durable
    /// copy; a missing or unremovable file is informational, never an error.
    /// Returns whether the durable copy was removed.
    pub fn clear(&mut self, purge_file: bool) -> bool {
        self.turns.clear();
        if !purge_file {
            return false;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(err) => {
                tracing::info!(path = %self.path.display(), %err, "no conversation file to remove");
                false
            }
        }
    }

    /// Read-only view of the log for rendering and context assembly:
    /// role/content pairs in insertion order, timestamps stripped.
    pub fn projection(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_turns() -> Vec<Turn> {
        vec![
            Turn {
                role: Role::User,
                content: "hello".to_string(),
                time: "2024-01-01 10:00:00".to_string(),
            },
            Turn {
                role: Role::Assistant,
                content: "hi there".to_string(),
                time: "2024-01-01 10:00:02".to_string(),
            },
        ]
    }

    #[test]
    fn load_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::load(dir.path(), "bot");
        assert!(store.is_empty());
    }

    #[test]
    fn load_corrupt_file_resets_to_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bot.json"), "{not json!").unwrap();
        let store = ConversationStore::load(dir.path(), "bot");
        assert!(store.is_empty());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::load(dir.path(), "bot");
        for turn in sample_turns() {
            store.append(turn);
        }
        store.persist().unwrap();

        let reloaded = ConversationStore::load(dir.path(), "bot");
        assert_eq!(reloaded.turns(), &sample_turns()[..]);
    }

    #[test]
    fn persist_preserves_non_ascii_literally() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::load(dir.path(), "bot");
        store.append(Turn {
            role: Role::User,
            content: "你好，世界 🤖".to_string(),
            time: "2024-01-01 10:00:00".to_string(),
        });
        store.persist().unwrap();

        // The raw file must contain the characters themselves, not \u escapes
        let raw = fs::read_to_string(dir.path().join("bot.json")).unwrap();
        assert!(raw.contains("你好，世界 🤖"));

        let reloaded = ConversationStore::load(dir.path(), "bot");
        assert_eq!(reloaded.turns()[0].content, "你好，世界 🤖");
    }

    #[test]
    fn clear_in_memory_only_keeps_durable_copy() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::load(dir.path(), "bot");
        for turn in sample_turns() {
            store.append(turn);
        }
        store.persist().unwrap();

        store.clear(false);
        assert!(store.is_empty());

        let reloaded = ConversationStore::load(dir.path(), "bot");
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn clear_with_purge_removes_durable_copy() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::load(dir.path(), "bot");
        for turn in sample_turns() {
            store.append(turn);
        }
        store.persist().unwrap();

        let purged = store.clear(true);
        assert!(purged);
        assert!(store.is_empty());

        let reloaded = ConversationStore::load(dir.path(), "bot");
        assert!(reloaded.is_empty());
    }

    #[test]
    fn clear_with_purge_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::load(dir.path(), "bot");
        store.append(Turn::now(Role::User, "hello"));

        // Never persisted, so there is nothing to remove
        let purged = store.clear(true);
        assert!(!purged);
        assert!(store.is_empty());
    }

    #[test]
    fn projection_strips_timestamps_and_keeps_order() {
        let dir = tempdir().unwrap();
        let mut store = ConversationStore::load(dir.path(), "bot");
        for turn in sample_turns() {
            store.append(turn);
        }

        let view = store.projection();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].role, "user");
        assert_eq!(view[0].content, "hello");
        assert_eq!(view[1].role, "assistant");
        assert_eq!(view[1].content, "hi there");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
