//! File-backed conversation storage.
//!
//! One directory per instance:
//!
//! ```text
//! {base}/{instance}/
//!   index.md                                  topic/keyword/recent index
//!   sessions.md                               session → conversation map
//!   conversations/{YYYY-MM-DD}/conv-{id}.md   one file per conversation
//! ```
//!
//! Every write goes through write-to-temp-then-rename, so a reader never
//! observes a partial file. Reads are lenient: missing or damaged files
//! degrade to empty values with a warning. Only a failed write surfaces an
//! error ([`StoreError`]).

pub mod conversation;
pub mod index;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs;

use crate::types::{Conversation, MemoryIndex};

const INDEX_FILE: &str = "index.md";
const SESSIONS_FILE: &str = "sessions.md";
const CONVERSATIONS_DIR: &str = "conversations";

/// session id → owning conversation.
pub type SessionMap = BTreeMap<String, SessionEntry>;

/// Where a session's conversation lives.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub conversation_id: String,
    /// Conversation file path relative to the instance root.
    pub path: String,
}

/// Storage failures that must reach the caller. Read-side problems degrade
/// to empty values instead of raising.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to prepare directory {path}")]
    Layout {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Render a timestamp the way the files store it: RFC 3339, second
/// precision, `Z` suffix.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Handle to one instance's files. Cheap to clone; all I/O is async.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    root: PathBuf,
    instance: String,
}

impl ConversationStore {
    /// Store rooted at `{base}/{instance}`.
    pub fn new(base: &Path, instance: &str) -> Self {
        Self {
            root: base.join(instance),
            instance: instance.to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Create the directory layout and seed an empty index when absent.
    /// Idempotent.
    pub async fn ensure_layout(&self) -> Result<(), StoreError> {
        let conversations = self.root.join(CONVERSATIONS_DIR);
        fs::create_dir_all(&conversations)
            .await
            .map_err(|source| StoreError::Layout {
                path: conversations.display().to_string(),
                source,
            })?;
        if fs::metadata(self.root.join(INDEX_FILE)).await.is_err() {
            self.save_index(&MemoryIndex::empty(&self.instance)).await?;
        }
        Ok(())
    }

    /// Persist a conversation under its date shard.
    pub async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let path = self.root.join(conversation.rel_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Layout {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        self.write_atomic(&path, &conversation::encode(conversation))
            .await
    }

    /// Load a conversation by its path relative to the instance root.
    /// Missing or unparseable files yield `None`.
    pub async fn load_conversation_at(&self, rel_path: &str) -> Option<Conversation> {
        let path = self.root.join(rel_path);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read conversation file");
                }
                return None;
            }
        };
        let decoded = conversation::decode(&text);
        if decoded.is_none() {
            tracing::warn!(path = %path.display(), "skipping unparseable conversation file");
        }
        decoded
    }

    /// Locate a conversation by id, walking the date shards newest-first.
    /// Works even when the conversation has aged out of the recent list.
    pub async fn find_conversation(&self, id: &str) -> Option<Conversation> {
        let dir = self.root.join(CONVERSATIONS_DIR);
        let mut entries = fs::read_dir(&dir).await.ok()?;
        let mut shards = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                shards.push(entry.file_name());
            }
        }
        // Shard names are dates, so lexicographic order is date order.
        shards.sort();
        shards.reverse();

        let file = format!("conv-{id}.md");
        for shard in shards {
            let rel = format!("{CONVERSATIONS_DIR}/{}/{file}", shard.to_string_lossy());
            if fs::metadata(self.root.join(&rel)).await.is_ok() {
                return self.load_conversation_at(&rel).await;
            }
        }
        None
    }

    /// Load the index, degrading to an empty one on any failure.
    pub async fn load_index(&self) -> MemoryIndex {
        let path = self.root.join(INDEX_FILE);
        match fs::read_to_string(&path).await {
            Ok(text) => index::decode(&text, &self.instance),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read index, starting empty");
                }
                MemoryIndex::empty(&self.instance)
            }
        }
    }

    pub async fn save_index(&self, index: &MemoryIndex) -> Result<(), StoreError> {
        self.write_atomic(&self.root.join(INDEX_FILE), &index::encode(index))
            .await
    }

    /// Load the session map, degrading to empty on any failure.
    pub async fn load_sessions(&self) -> SessionMap {
        let path = self.root.join(SESSIONS_FILE);
        match fs::read_to_string(&path).await {
            Ok(text) => index::decode_sessions(&text),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read session map, starting empty");
                }
                SessionMap::new()
            }
        }
    }

    pub async fn save_sessions(&self, sessions: &SessionMap) -> Result<(), StoreError> {
        self.write_atomic(
            &self.root.join(SESSIONS_FILE),
            &index::encode_sessions(&self.instance, sessions),
        )
        .await
    }

    /// Resolve a session to its conversation: session map first, then a scan
    /// of the recent list. The scan covers session maps lost to damage or
    /// hand edits.
    pub async fn resolve_session(
        &self,
        session_id: &str,
        sessions: &SessionMap,
        index: &MemoryIndex,
    ) -> Option<Conversation> {
        if let Some(entry) = sessions.get(session_id) {
            if let Some(conversation) = self.load_conversation_at(&entry.path).await {
                if conversation.session_id.as_deref() == Some(session_id) {
                    return Some(conversation);
                }
            }
        }
        for entry in &index.recent {
            if let Some(conversation) = self.load_conversation_at(&entry.path).await {
                if conversation.session_id.as_deref() == Some(session_id) {
                    return Some(conversation);
                }
            }
        }
        None
    }

    /// Write-to-temp-then-rename. The rename makes the update atomic for
    /// readers on the same filesystem.
    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)
            .await
            .map_err(|source| StoreError::Write {
                path: tmp.display().to_string(),
                source,
            })?;
        fs::rename(&tmp, path)
            .await
            .map_err(|source| StoreError::Write {
                path: path.display().to_string(),
                source,
            })?;
        Ok(())
    }
}
