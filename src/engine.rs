//! Memory engine orchestrator.
//!
//! [`MemoryEngine`] owns one instance's store, a TTL-bounded index cache,
//! and a write lock that serializes every index mutation. Public operations
//! return structured outcomes instead of raising: a failed record or an
//! unavailable store degrades the feature, never the host. The one storage
//! error that does surface (inside `RecordOutcome::error`) is a failed
//! atomic write.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::analysis::{self, topics};
use crate::retrieval::{self, RetrievalOptions, ScoredMatch};
use crate::storage::{ConversationStore, SessionEntry, StoreError};
use crate::types::{Conversation, ConversationSummary, MemoryIndex, MemoryStats};

/// How long a cached index snapshot stays valid for reads.
const INDEX_CACHE_TTL: Duration = Duration::from_secs(30);

/// Construction-time knobs for an engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub enabled: bool,
    /// Cap on conversations injected per context block.
    pub max_context_items: usize,
    /// Token budget for an assembled context block.
    pub max_context_tokens: usize,
    /// Score floor for context retrieval.
    pub min_score: f64,
    /// Weight of the positional recency bonus.
    pub recency_boost: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_items: retrieval::DEFAULT_MAX_RESULTS,
            max_context_tokens: retrieval::DEFAULT_MAX_CONTEXT_TOKENS,
            min_score: retrieval::DEFAULT_MIN_SCORE,
            recency_boost: retrieval::DEFAULT_RECENCY_BOOST,
        }
    }
}

/// Result of a record operation. Failures land in `error`; the host keeps
/// running either way.
#[derive(Debug, Serialize)]
pub struct RecordOutcome {
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_conversation: Option<bool>,
    /// Keywords extracted from this exchange.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Topics classified for this exchange.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            recorded: false,
            conversation_id: None,
            new_conversation: None,
            keywords: Vec::new(),
            topics: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// Result of a context retrieval. `reason` explains why no context was used.
#[derive(Debug, Serialize)]
pub struct ContextOutcome {
    pub context_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ContextSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One conversation that contributed to a context block.
#[derive(Debug, Serialize)]
pub struct ContextSource {
    pub id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ContextOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            context_used: false,
            context: None,
            summary: None,
            sources: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

#[derive(Default)]
struct IndexCache {
    index: Option<MemoryIndex>,
    fetched_at: Option<Instant>,
}

/// One memory instance: its store, cache, and write serialization.
pub struct MemoryEngine {
    store: ConversationStore,
    options: EngineOptions,
    enabled: bool,
    cache: Mutex<IndexCache>,
    write_lock: Mutex<()>,
}

impl MemoryEngine {
    /// Factory. Never fails: any initialization problem leaves a disabled
    /// engine whose operations all answer with a structured "unavailable".
    pub async fn initialize(base: &Path, instance: &str, options: EngineOptions) -> Self {
        let store = ConversationStore::new(base, instance);
        let mut enabled = options.enabled;
        if enabled {
            if let Err(e) = store.ensure_layout().await {
                tracing::warn!(instance, error = %e, "memory disabled: storage layout failed");
                enabled = false;
            }
        }

        let engine = Self {
            store,
            options,
            enabled,
            cache: Mutex::new(IndexCache::default()),
            write_lock: Mutex::new(()),
        };
        if engine.enabled {
            // Warm the cache so the first retrieval skips the load.
            let index = engine.store.load_index().await;
            engine.refresh_cache(index).await;
            tracing::info!(
                instance = engine.store.instance(),
                root = %engine.store.root().display(),
                "memory engine ready"
            );
        }
        engine
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn instance(&self) -> &str {
        self.store.instance()
    }

    /// Record one question/answer exchange.
    ///
    /// With a `session_id` that maps to an existing conversation the exchange
    /// is appended there; otherwise a new conversation is created. The index
    /// (and session map) update under the write lock, and the cache refreshes
    /// eagerly so the writer observes its own write.
    pub async fn record(
        &self,
        question: &str,
        answer: &str,
        session_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> RecordOutcome {
        if !self.enabled {
            return RecordOutcome::failed("memory disabled");
        }
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            return RecordOutcome::failed("question and answer must be non-empty");
        }

        let keywords =
            analysis::exchange_keywords(question, answer, analysis::DEFAULT_MAX_KEYWORDS);
        let topics = topics::extract_topics(&format!("{question} {answer}"));

        // Index and session-map mutations are serialized. Conversation files
        // have unique paths, so the lock is about the shared files.
        let _guard = self.write_lock.lock().await;

        match self
            .write_exchange(question, answer, session_id, &keywords, &topics)
            .await
        {
            Ok((conversation, is_new)) => {
                if let Some(metadata) = metadata {
                    tracing::debug!(id = %conversation.id, %metadata, "record metadata");
                }
                tracing::info!(
                    id = %conversation.id,
                    new = is_new,
                    exchanges = conversation.exchanges.len(),
                    "recorded conversation exchange"
                );
                RecordOutcome {
                    recorded: true,
                    conversation_id: Some(conversation.id),
                    new_conversation: Some(is_new),
                    keywords,
                    topics,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to record conversation");
                RecordOutcome::failed(e.to_string())
            }
        }
    }

    /// Retrieve a bounded context block for a new question.
    ///
    /// `max_items` and `max_tokens` override the engine defaults for this
    /// call only.
    pub async fn relevant_context(
        &self,
        question: &str,
        max_items: Option<usize>,
        max_tokens: Option<usize>,
    ) -> ContextOutcome {
        if !self.enabled {
            return ContextOutcome::skipped("memory disabled");
        }
        if !retrieval::should_retrieve(question) {
            return ContextOutcome::skipped("question too short or conversational");
        }

        let index = self.cached_index().await;
        let options = RetrievalOptions {
            max_results: max_items.unwrap_or(self.options.max_context_items),
            min_score: self.options.min_score,
            recency_boost: self.options.recency_boost,
        };
        let matches = retrieval::find_relevant(question, &index, &options);
        if matches.is_empty() {
            return ContextOutcome::skipped("no relevant past conversations");
        }

        // Load bodies; a missing or damaged file just drops that match.
        let mut loaded: Vec<(ScoredMatch, Conversation)> = Vec::new();
        for scored in matches {
            let conversation = match &scored.path {
                Some(path) => self.store.load_conversation_at(path).await,
                None => self.store.find_conversation(&scored.id).await,
            };
            if let Some(conversation) = conversation {
                loaded.push((scored, conversation));
            }
        }
        if loaded.is_empty() {
            return ContextOutcome::skipped("matched conversations could not be read");
        }

        let query_keywords =
            analysis::extract_keywords(question, analysis::DEFAULT_MAX_KEYWORDS);
        retrieval::rank_by_relevance(&mut loaded, &query_keywords);

        let budget = max_tokens.unwrap_or(self.options.max_context_tokens);
        let context = retrieval::format_context(&loaded, budget);
        let summary = retrieval::context_summary(&loaded);
        let sources: Vec<ContextSource> = loaded
            .iter()
            .map(|(scored, conversation)| ContextSource {
                id: scored.id.clone(),
                score: scored.score,
                summary: scored
                    .summary
                    .clone()
                    .or_else(|| Some(conversation.summary())),
            })
            .collect();

        tracing::debug!(
            matches = loaded.len(),
            tokens = retrieval::estimate_tokens(&context),
            "assembled memory context"
        );

        ContextOutcome {
            context_used: true,
            context: Some(context),
            summary: Some(summary),
            sources,
            reason: None,
        }
    }

    /// Index-only search over keywords and topics.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ConversationSummary> {
        if !self.enabled {
            return Vec::new();
        }
        let index = self.cached_index().await;
        retrieval::search(query, &index, limit)
    }

    /// Most recent conversations, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<ConversationSummary> {
        if !self.enabled {
            return Vec::new();
        }
        let index = self.cached_index().await;
        index
            .recent
            .iter()
            .take(limit)
            .map(ConversationSummary::from_recent)
            .collect()
    }

    /// Full conversation by id. Resolves through the date shards, so it works
    /// even after the conversation ages out of the recent list.
    pub async fn conversation(&self, id: &str) -> Option<Conversation> {
        if !self.enabled {
            return None;
        }
        self.store.find_conversation(id).await
    }

    /// Aggregate counts from the index.
    pub async fn stats(&self) -> MemoryStats {
        if !self.enabled {
            return MemoryStats::from_index(&MemoryIndex::empty(self.store.instance()));
        }
        let index = self.cached_index().await;
        MemoryStats::from_index(&index)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// The full write sequence, called under the write lock: resolve the
    /// session, persist the conversation, fold it into a freshly loaded
    /// index, persist index and session map.
    async fn write_exchange(
        &self,
        question: &str,
        answer: &str,
        session_id: Option<&str>,
        keywords: &[String],
        topics: &[String],
    ) -> Result<(Conversation, bool), StoreError> {
        let mut sessions = self.store.load_sessions().await;
        // Authoritative re-read; the cache may be stale.
        let mut index = self.store.load_index().await;

        let existing = match session_id {
            Some(sid) => self.store.resolve_session(sid, &sessions, &index).await,
            None => None,
        };

        let (conversation, is_new) = match existing {
            Some(mut conversation) => {
                conversation.append(question, answer, keywords, topics);
                (conversation, false)
            }
            None => (
                Conversation::new(question, answer, session_id, keywords.to_vec(), topics.to_vec()),
                true,
            ),
        };

        self.store.save_conversation(&conversation).await?;

        index.index_conversation(&conversation, is_new);
        self.store.save_index(&index).await?;

        if is_new {
            if let Some(sid) = session_id {
                sessions.insert(
                    sid.to_owned(),
                    SessionEntry {
                        conversation_id: conversation.id.clone(),
                        path: conversation.rel_path(),
                    },
                );
                self.store.save_sessions(&sessions).await?;
            }
        }

        self.refresh_cache(index).await;
        Ok((conversation, is_new))
    }

    /// Cached index snapshot, reloaded once it is older than the TTL.
    async fn cached_index(&self) -> MemoryIndex {
        let mut cache = self.cache.lock().await;
        let fresh = cache
            .fetched_at
            .is_some_and(|at| at.elapsed() < INDEX_CACHE_TTL);
        if fresh {
            if let Some(index) = cache.index.as_ref() {
                return index.clone();
            }
        }
        let index = self.store.load_index().await;
        cache.index = Some(index.clone());
        cache.fetched_at = Some(Instant::now());
        index
    }

    async fn refresh_cache(&self, index: MemoryIndex) {
        let mut cache = self.cache.lock().await;
        cache.index = Some(index);
        cache.fetched_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn engine(options: EngineOptions) -> (TempDir, MemoryEngine) {
        let dir = TempDir::new().unwrap();
        let engine = MemoryEngine::initialize(dir.path(), "default", options).await;
        (dir, engine)
    }

    #[tokio::test]
    async fn test_disabled_engine_degrades_every_operation() {
        let options = EngineOptions {
            enabled: false,
            ..Default::default()
        };
        let (_dir, engine) = engine(options).await;
        assert!(!engine.is_enabled());

        let record = engine.record("a question", "an answer", None, None).await;
        assert!(!record.recorded);
        assert_eq!(record.error.as_deref(), Some("memory disabled"));

        let context = engine
            .relevant_context("how do I configure docker?", None, None)
            .await;
        assert!(!context.context_used);
        assert_eq!(context.reason.as_deref(), Some("memory disabled"));

        assert!(engine.search("docker", 5).await.is_empty());
        assert!(engine.recent(5).await.is_empty());
        assert!(engine.conversation("deadbeef").await.is_none());
        assert_eq!(engine.stats().await.total_conversations, 0);
    }

    #[tokio::test]
    async fn test_initialize_failure_disables_instead_of_failing() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("occupied");
        tokio::fs::write(&blocker, "not a directory").await.unwrap();

        // The base path is a file, so layout creation cannot succeed.
        let engine =
            MemoryEngine::initialize(&blocker, "default", EngineOptions::default()).await;
        assert!(!engine.is_enabled());
        let outcome = engine.record("a question", "an answer", None, None).await;
        assert!(!outcome.recorded);
    }

    #[tokio::test]
    async fn test_record_validates_empty_inputs() {
        let (_dir, engine) = engine(EngineOptions::default()).await;
        let outcome = engine.record("   ", "an answer", None, None).await;
        assert!(!outcome.recorded);
        assert!(outcome.error.unwrap().contains("non-empty"));

        let outcome = engine.record("a question", "", None, None).await;
        assert!(!outcome.recorded);
    }

    #[tokio::test]
    async fn test_writer_observes_its_own_write() {
        let (_dir, engine) = engine(EngineOptions::default()).await;
        let outcome = engine
            .record(
                "How do I use JWT authentication?",
                "Sign a token on login and verify it per request.",
                None,
                None,
            )
            .await;
        assert!(outcome.recorded);
        assert_eq!(outcome.new_conversation, Some(true));
        assert!(outcome.keywords.contains(&"jwt".to_string()));
        assert_eq!(outcome.topics, vec!["security"]);

        // Immediately visible without waiting out the cache TTL.
        let recent = engine.recent(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, outcome.conversation_id.unwrap());
        assert_eq!(engine.stats().await.total_conversations, 1);
    }

    #[tokio::test]
    async fn test_per_call_override_limits_context_items() {
        let (_dir, engine) = engine(EngineOptions::default()).await;
        let first = engine
            .record(
                "How do I use JWT authentication?",
                "Sign a token on login and verify it per request.",
                None,
                None,
            )
            .await;
        assert!(first.recorded);
        let second = engine
            .record(
                "How should I store OAuth tokens securely?",
                "Encrypt tokens at rest and rotate encryption keys.",
                None,
                None,
            )
            .await;
        assert!(second.recorded);

        let question = "What is the best way to secure JWT and OAuth token authentication?";
        let full = engine.relevant_context(question, None, None).await;
        assert!(full.context_used);
        assert_eq!(full.sources.len(), 2);

        let capped = engine.relevant_context(question, Some(1), None).await;
        assert!(capped.context_used);
        assert_eq!(capped.sources.len(), 1);
    }
}
