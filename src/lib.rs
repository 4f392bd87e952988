//! Conversation memory for AI assistants — durable, searchable, cross-session
//! context.
//!
//! Hindsight records question/answer exchanges as human-readable markdown
//! files, maintains a keyword/topic index over them, and retrieves relevant
//! prior exchanges as a token-bounded context block for new questions. The
//! memory is a feature of its host: every operation degrades to a structured
//! outcome rather than an error, so an unavailable store never takes the
//! assistant down with it.
//!
//! # Architecture
//!
//! - **Storage**: date-sharded markdown conversation files plus a single
//!   `index.md` per instance, all written atomically (tmp + rename)
//! - **Analysis**: stop-word-filtered keyword extraction and a fixed
//!   topic taxonomy, no model inference involved
//! - **Retrieval**: keyword/topic scoring with recency and body-similarity
//!   bonuses, assembled into a context block under a token budget
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`types`] — Conversations, exchanges, and the in-memory index
//! - [`analysis`] — Tokenization, keyword extraction, topic classification
//! - [`storage`] — Markdown codecs and the per-instance file store
//! - [`retrieval`] — Scoring, ranking, and context assembly
//! - [`engine`] — [`engine::MemoryEngine`], the orchestrator hosts embed

pub mod analysis;
pub mod config;
pub mod engine;
pub mod retrieval;
pub mod storage;
pub mod types;
