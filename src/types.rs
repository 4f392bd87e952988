//! Core conversation memory types.
//!
//! Defines [`Exchange`] (one question/answer pair), [`Conversation`] (a full
//! recorded conversation), [`MemoryIndex`] (the in-memory form of the index
//! file), and the summary/stats structs returned by engine operations.

#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis;

/// Maximum number of entries kept in the recent-conversations list.
pub const RECENT_CAP: usize = 50;

/// Maximum character length of a conversation summary line.
pub const SUMMARY_MAX_CHARS: usize = 60;

/// One question/answer pair. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// UTC timestamp of when the exchange was recorded.
    pub timestamp: DateTime<Utc>,
    /// The user's question, verbatim.
    pub question: String,
    /// The assistant's answer, verbatim.
    pub answer: String,
}

/// A recorded conversation: an ordered list of exchanges plus the keywords
/// and topics accumulated across them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Short hex token, assigned at creation, never changes.
    pub id: String,
    /// Caller-supplied session identifier, if the host tracks sessions.
    pub session_id: Option<String>,
    /// UTC creation timestamp. Determines the date shard the file lives in.
    pub created: DateTime<Utc>,
    /// UTC timestamp of the most recent exchange.
    pub updated: DateTime<Utc>,
    /// Deduplicated keywords in first-seen order.
    pub keywords: Vec<String>,
    /// Deduplicated topics in first-seen order. Accumulate across appends.
    pub topics: Vec<String>,
    /// Exchanges in recording order. Never empty for a persisted conversation.
    pub exchanges: Vec<Exchange>,
}

impl Conversation {
    /// Create a new conversation from its first exchange.
    pub fn new(
        question: &str,
        answer: &str,
        session_id: Option<&str>,
        keywords: Vec<String>,
        topics: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_conversation_id(),
            session_id: session_id.map(str::to_owned),
            created: now,
            updated: now,
            keywords,
            topics,
            exchanges: vec![Exchange {
                timestamp: now,
                question: question.to_owned(),
                answer: answer.to_owned(),
            }],
        }
    }

    /// Append an exchange, merging its keywords and topics into the
    /// conversation-level sets.
    pub fn append(&mut self, question: &str, answer: &str, keywords: &[String], topics: &[String]) {
        let now = Utc::now();
        self.exchanges.push(Exchange {
            timestamp: now,
            question: question.to_owned(),
            answer: answer.to_owned(),
        });
        merge_terms(&mut self.keywords, keywords);
        merge_terms(&mut self.topics, topics);
        self.updated = now;
    }

    /// Path of the conversation file relative to the instance root.
    pub fn rel_path(&self) -> String {
        format!(
            "conversations/{}/conv-{}.md",
            self.created.date_naive().format("%Y-%m-%d"),
            self.id
        )
    }

    /// One-line summary: the first question, whitespace-collapsed and
    /// truncated.
    pub fn summary(&self) -> String {
        let first = self
            .exchanges
            .first()
            .map(|e| e.question.as_str())
            .unwrap_or("");
        analysis::condense(first, SUMMARY_MAX_CHARS)
    }
}

/// Generate a short conversation id: the first 8 hex chars of a UUID v4.
pub fn new_conversation_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Append `new` terms to `existing`, skipping duplicates, preserving order.
fn merge_terms(existing: &mut Vec<String>, new: &[String]) {
    for term in new {
        if !existing.iter().any(|t| t == term) {
            existing.push(term.clone());
        }
    }
}

/// One conversation's entry under a topic heading in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub id: String,
    /// Conversation file path relative to the instance root.
    pub path: String,
    pub summary: String,
}

/// One line of the recent-conversations list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEntry {
    /// Date of the most recent activity (UTC).
    pub date: NaiveDate,
    pub id: String,
    pub summary: String,
    pub keywords: Vec<String>,
    /// Conversation file path relative to the instance root.
    pub path: String,
}

/// In-memory form of the index file. Rebuilt from disk on load; mutated on
/// every successful record and written back atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryIndex {
    /// Instance this index belongs to.
    pub instance: String,
    /// When the index was last written, if ever.
    pub last_updated: Option<DateTime<Utc>>,
    /// Running count of conversations ever created under this instance.
    pub total_conversations: u64,
    /// topic → conversations carrying it. Sorted for stable output.
    pub topics: BTreeMap<String, Vec<TopicEntry>>,
    /// keyword → conversation ids containing it. Sorted for stable output.
    pub keywords: BTreeMap<String, Vec<String>>,
    /// Most-recent-first, capped at [`RECENT_CAP`].
    pub recent: Vec<RecentEntry>,
}

impl MemoryIndex {
    /// A fresh index with no conversations.
    pub fn empty(instance: &str) -> Self {
        Self {
            instance: instance.to_owned(),
            last_updated: None,
            total_conversations: 0,
            topics: BTreeMap::new(),
            keywords: BTreeMap::new(),
            recent: Vec::new(),
        }
    }

    /// Fold a conversation into the index: keyword postings, topic entries,
    /// recent-list front insert with tail eviction, counters.
    pub fn index_conversation(&mut self, conversation: &Conversation, is_new: bool) {
        let path = conversation.rel_path();
        let summary = conversation.summary();

        for keyword in &conversation.keywords {
            let ids = self.keywords.entry(keyword.clone()).or_default();
            if !ids.iter().any(|id| id == &conversation.id) {
                ids.push(conversation.id.clone());
            }
        }

        for topic in &conversation.topics {
            let entries = self.topics.entry(topic.clone()).or_default();
            match entries.iter_mut().find(|e| e.id == conversation.id) {
                Some(entry) => entry.summary = summary.clone(),
                None => entries.push(TopicEntry {
                    id: conversation.id.clone(),
                    path: path.clone(),
                    summary: summary.clone(),
                }),
            }
        }

        self.recent.retain(|e| e.id != conversation.id);
        self.recent.insert(
            0,
            RecentEntry {
                date: conversation.updated.date_naive(),
                id: conversation.id.clone(),
                summary,
                keywords: conversation.keywords.clone(),
                path,
            },
        );
        self.recent.truncate(RECENT_CAP);

        if is_new {
            self.total_conversations += 1;
        }
        self.last_updated = Some(conversation.updated);
    }
}

/// A conversation reference returned by search/recent operations. Matches
/// known only through keyword postings may lack a date and path.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub summary: String,
    pub keywords: Vec<String>,
    /// Conversation file path relative to the instance root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Relevance score, present for search results only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ConversationSummary {
    pub fn from_recent(entry: &RecentEntry) -> Self {
        Self {
            id: entry.id.clone(),
            date: Some(entry.date),
            summary: entry.summary.clone(),
            keywords: entry.keywords.clone(),
            path: Some(entry.path.clone()),
            score: None,
        }
    }
}

/// Aggregate counts derived from the index.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_conversations: u64,
    pub total_topics: usize,
    pub total_keywords: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MemoryStats {
    /// Derive stats from an index snapshot.
    pub fn from_index(index: &MemoryIndex) -> Self {
        Self {
            total_conversations: index.total_conversations,
            total_topics: index.topics.len(),
            total_keywords: index.keywords.len(),
            last_updated: index.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str, keywords: &[&str], topics: &[&str]) -> Conversation {
        let mut c = Conversation::new(
            "How do I rotate signing keys?",
            "Generate a new key pair and phase the old one out.",
            None,
            keywords.iter().map(|s| s.to_string()).collect(),
            topics.iter().map(|s| s.to_string()).collect(),
        );
        c.id = id.to_owned();
        c
    }

    #[test]
    fn test_new_conversation_id_is_short_hex() {
        let id = new_conversation_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_append_merges_terms_without_duplicates() {
        let mut c = conv("aaaa0001", &["jwt", "token"], &["security"]);
        c.append(
            "What about refresh tokens?",
            "Store them server-side.",
            &["token".into(), "refresh".into()],
            &["security".into()],
        );
        assert_eq!(c.exchanges.len(), 2);
        assert_eq!(c.keywords, vec!["jwt", "token", "refresh"]);
        assert_eq!(c.topics, vec!["security"]);
        assert!(c.updated >= c.created);
    }

    #[test]
    fn test_rel_path_shards_by_created_date() {
        let c = conv("aaaa0002", &[], &[]);
        let date = c.created.date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(c.rel_path(), format!("conversations/{date}/conv-aaaa0002.md"));
    }

    #[test]
    fn test_index_conversation_posts_keywords_and_topics() {
        let mut index = MemoryIndex::empty("default");
        let c = conv("aaaa0003", &["jwt", "token"], &["security"]);
        index.index_conversation(&c, true);

        assert_eq!(index.total_conversations, 1);
        assert_eq!(index.keywords["jwt"], vec!["aaaa0003"]);
        assert_eq!(index.topics["security"][0].id, "aaaa0003");
        assert_eq!(index.recent.len(), 1);
    }

    #[test]
    fn test_reindex_moves_entry_to_front_without_recount() {
        let mut index = MemoryIndex::empty("default");
        let a = conv("aaaa0004", &["jwt"], &[]);
        let b = conv("bbbb0004", &["rust"], &[]);
        index.index_conversation(&a, true);
        index.index_conversation(&b, true);
        assert_eq!(index.recent[0].id, "bbbb0004");

        index.index_conversation(&a, false);
        assert_eq!(index.recent[0].id, "aaaa0004");
        assert_eq!(index.recent.len(), 2);
        assert_eq!(index.total_conversations, 2);
        assert_eq!(index.keywords["jwt"], vec!["aaaa0004"]);
    }

    #[test]
    fn test_recent_list_evicts_tail_at_cap() {
        let mut index = MemoryIndex::empty("default");
        for i in 0..RECENT_CAP + 5 {
            let c = conv(&format!("{i:08x}"), &[], &[]);
            index.index_conversation(&c, true);
        }
        assert_eq!(index.recent.len(), RECENT_CAP);
        assert_eq!(index.total_conversations, (RECENT_CAP + 5) as u64);
        // Newest first, oldest evicted.
        assert_eq!(index.recent[0].id, format!("{:08x}", RECENT_CAP + 4));
        assert!(!index.recent.iter().any(|e| e.id == format!("{:08x}", 0)));
    }
}
