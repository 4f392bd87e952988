//! Relevance scoring and bounded context assembly.
//!
//! Everything here is pure over an index snapshot (and, for the second
//! ranking pass, loaded conversation bodies). Scores combine a keyword-match
//! base, topic bonuses, and a recency bonus; the base is normalized to
//! `[0, 1]` but bonuses stack on top, so scores can exceed 1.0. Ordering is
//! deterministic: equal scores resolve by conversation id.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::analysis::{self, topics};
use crate::types::{Conversation, ConversationSummary, MemoryIndex};

// ── Public types ──────────────────────────────────────────────────────────────

/// Default cap on conversations injected as context.
pub const DEFAULT_MAX_RESULTS: usize = 3;
/// Default score floor for context retrieval.
pub const DEFAULT_MIN_SCORE: f64 = 0.1;
/// Default weight of the positional recency bonus.
pub const DEFAULT_RECENCY_BOOST: f64 = 0.1;
/// Default token budget for an assembled context block.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 2000;
/// Score floor for explicit searches, looser than context retrieval.
pub const SEARCH_MIN_SCORE: f64 = 0.05;

/// Added per topic shared between the question and a conversation.
const TOPIC_BONUS: f64 = 0.3;
/// Weight of the best per-exchange overlap in the second ranking pass.
const BODY_BONUS: f64 = 0.5;
/// Fraction of the token budget after which assembly stops outright.
const BUDGET_HARD_STOP: f64 = 0.9;
/// Questions shorter than this never trigger retrieval.
const MIN_QUESTION_CHARS: usize = 10;

const CONTEXT_HEADER: &str = "Relevant context from previous conversations:\n\n";
const CONTEXT_FOOTER: &str = "(End of recalled context.)\n";

/// Scoring knobs for context retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub max_results: usize,
    pub min_score: f64,
    pub recency_boost: f64,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            min_score: DEFAULT_MIN_SCORE,
            recency_boost: DEFAULT_RECENCY_BOOST,
        }
    }
}

/// An index match with its relevance score. Path and summary are filled
/// when the index knows them (recent list or a topic section).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Score index candidates against a question.
///
/// Base score = matched query keywords / total query keywords. Each shared
/// topic adds [`TOPIC_BONUS`]; presence in the recent list adds
/// `recency_boost * (1 - position / len)`. Candidates below `min_score` are
/// dropped; the rest come back best-first, capped at `max_results`.
pub fn find_relevant(
    question: &str,
    index: &MemoryIndex,
    options: &RetrievalOptions,
) -> Vec<ScoredMatch> {
    let query_keywords = analysis::extract_keywords(question, analysis::DEFAULT_MAX_KEYWORDS);
    if query_keywords.is_empty() {
        return Vec::new();
    }
    let query_topics = topics::extract_topics(question);

    // 1. Keyword base score.
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut hits: HashMap<&str, usize> = HashMap::new();
    for keyword in &query_keywords {
        if let Some(ids) = index.keywords.get(keyword) {
            for id in ids {
                *hits.entry(id.as_str()).or_insert(0) += 1;
            }
        }
    }
    for (id, matched) in hits {
        scores.insert(id.to_owned(), matched as f64 / query_keywords.len() as f64);
    }

    // 2. Topic bonus, stacking per shared topic. Topic-only candidates
    //    enter here with a zero base.
    for topic in &query_topics {
        if let Some(entries) = index.topics.get(topic) {
            for entry in entries {
                *scores.entry(entry.id.clone()).or_insert(0.0) += TOPIC_BONUS;
            }
        }
    }

    // 3. Recency bonus by position in the recent list.
    let recent_len = index.recent.len();
    for (position, entry) in index.recent.iter().enumerate() {
        if let Some(score) = scores.get_mut(&entry.id) {
            *score += options.recency_boost * (1.0 - position as f64 / recent_len as f64);
        }
    }

    // 4. Filter, enrich, order.
    let known = known_locations(index);
    let mut matches: Vec<ScoredMatch> = scores
        .into_iter()
        .filter(|(_, score)| *score >= options.min_score)
        .map(|(id, score)| {
            let location = known.get(id.as_str());
            ScoredMatch {
                path: location.map(|(path, _)| (*path).to_owned()),
                summary: location.map(|(_, summary)| (*summary).to_owned()),
                id,
                score,
            }
        })
        .collect();
    sort_matches(&mut matches);
    matches.truncate(options.max_results);
    matches
}

/// Second scoring pass once bodies are loaded: the best per-exchange keyword
/// overlap (Jaccard) adds up to [`BODY_BONUS`], then matches are re-sorted.
pub fn rank_by_relevance(
    matches: &mut [(ScoredMatch, Conversation)],
    query_keywords: &[String],
) {
    for (scored, conversation) in matches.iter_mut() {
        let best = conversation
            .exchanges
            .iter()
            .map(|exchange| {
                let exchange_keywords = analysis::exchange_keywords(
                    &exchange.question,
                    &exchange.answer,
                    analysis::DEFAULT_MAX_KEYWORDS,
                );
                analysis::keyword_similarity(query_keywords, &exchange_keywords)
            })
            .fold(0.0, f64::max);
        scored.score += BODY_BONUS * best;
    }
    matches.sort_by(|a, b| {
        b.0.score
            .partial_cmp(&a.0.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
}

/// Decide whether a question deserves context at all. Very short inputs and
/// greetings/meta questions skip retrieval entirely.
pub fn should_retrieve(question: &str) -> bool {
    let trimmed = question.trim();
    if trimmed.chars().count() < MIN_QUESTION_CHARS {
        return false;
    }
    !greeting_re().is_match(trimmed)
}

/// Index-only search. A query with no usable keywords falls back to the
/// recent list.
pub fn search(query: &str, index: &MemoryIndex, limit: usize) -> Vec<ConversationSummary> {
    if analysis::extract_keywords(query, analysis::DEFAULT_MAX_KEYWORDS).is_empty() {
        return index
            .recent
            .iter()
            .take(limit)
            .map(ConversationSummary::from_recent)
            .collect();
    }

    let options = RetrievalOptions {
        max_results: limit,
        min_score: SEARCH_MIN_SCORE,
        ..Default::default()
    };
    find_relevant(query, index, &options)
        .into_iter()
        .map(|scored| match_summary(scored, index))
        .collect()
}

// ── Context assembly ──────────────────────────────────────────────────────────

/// Render matched conversations into a bounded context block: a fixed
/// header/footer around per-conversation sections of `Q:`/`A:` pairs. Costs
/// are tracked with [`estimate_tokens`]; the exchange that would exceed the
/// budget is truncated to the remaining allowance with an ellipsis, and
/// assembly stops outright at [`BUDGET_HARD_STOP`] of the budget. A
/// conversation whose heading fits but whose first exchange does not is
/// omitted entirely.
pub fn format_context(matches: &[(ScoredMatch, Conversation)], max_tokens: usize) -> String {
    let mut out = String::from(CONTEXT_HEADER);
    let mut used = estimate_tokens(CONTEXT_HEADER) + estimate_tokens(CONTEXT_FOOTER);
    let hard_stop = (max_tokens as f64 * BUDGET_HARD_STOP) as usize;
    let mut stopped = false;

    for (_, conversation) in matches {
        let heading = format!(
            "### {}: {}\n\n",
            conversation.created.date_naive().format("%Y-%m-%d"),
            conversation.summary()
        );
        let heading_cost = estimate_tokens(&heading);
        if used + heading_cost > max_tokens {
            break;
        }
        let heading_mark = out.len();
        out.push_str(&heading);
        used += heading_cost;

        let mut wrote_exchange = false;
        for exchange in &conversation.exchanges {
            if used >= hard_stop {
                stopped = true;
                break;
            }
            let block = format!(
                "Q: {}\nA: {}\n\n",
                exchange.question.trim(),
                exchange.answer.trim()
            );
            let cost = estimate_tokens(&block);
            if used + cost > max_tokens {
                let remaining = max_tokens.saturating_sub(used);
                if remaining > 0 {
                    out.push_str(truncate_to_tokens(&block, remaining).trim_end());
                    out.push_str("...\n\n");
                    wrote_exchange = true;
                }
                stopped = true;
                break;
            }
            out.push_str(&block);
            used += cost;
            wrote_exchange = true;
        }

        // Every heading in the block has at least one exchange under it.
        if !wrote_exchange {
            out.truncate(heading_mark);
            used -= heading_cost;
        }
        if stopped {
            break;
        }
    }

    out.push_str(CONTEXT_FOOTER);
    out
}

/// Short human-readable description of what matched, for logs and operation
/// results.
pub fn context_summary(matches: &[(ScoredMatch, Conversation)]) -> String {
    if matches.is_empty() {
        return "no related conversations".to_owned();
    }

    let mut topics: Vec<&str> = Vec::new();
    let mut keywords: Vec<&str> = Vec::new();
    for (_, conversation) in matches {
        for topic in &conversation.topics {
            if !topics.contains(&topic.as_str()) {
                topics.push(topic);
            }
        }
        for keyword in &conversation.keywords {
            if !keywords.contains(&keyword.as_str()) {
                keywords.push(keyword);
            }
        }
    }
    keywords.truncate(6);

    let matched = if !topics.is_empty() {
        format!("topics: {}", topics.join(", "))
    } else {
        format!("keywords: {}", keywords.join(", "))
    };
    let noun = if matches.len() == 1 {
        "conversation"
    } else {
        "conversations"
    };
    format!("{} past {} ({})", matches.len(), noun, matched)
}

/// Rough token estimate used for context budgeting: ceil(chars / 4).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn greeting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(hi|hiya|hey|hello|yo|thanks|thank you|ok|okay|yes|no|sure|bye|goodbye|good (morning|afternoon|evening|night)|how are you|who are you|what can you do)[\s.!?]*$",
        )
        .expect("greeting regex must compile")
    })
}

/// Map of id → (path, summary) drawn from the recent list and topic
/// sections. Recent entries win because their summaries are freshest.
fn known_locations(index: &MemoryIndex) -> HashMap<&str, (&str, &str)> {
    let mut known: HashMap<&str, (&str, &str)> = HashMap::new();
    for entries in index.topics.values() {
        for entry in entries {
            known
                .entry(entry.id.as_str())
                .or_insert((entry.path.as_str(), entry.summary.as_str()));
        }
    }
    for entry in &index.recent {
        known.insert(entry.id.as_str(), (entry.path.as_str(), entry.summary.as_str()));
    }
    known
}

fn sort_matches(matches: &mut [ScoredMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn match_summary(scored: ScoredMatch, index: &MemoryIndex) -> ConversationSummary {
    if let Some(entry) = index.recent.iter().find(|e| e.id == scored.id) {
        let mut summary = ConversationSummary::from_recent(entry);
        summary.score = Some(scored.score);
        return summary;
    }
    ConversationSummary {
        date: scored.path.as_deref().and_then(date_from_path),
        summary: scored.summary.unwrap_or_default(),
        keywords: Vec::new(),
        path: scored.path,
        score: Some(scored.score),
        id: scored.id,
    }
}

/// Recover the shard date from a `conversations/{date}/...` path.
fn date_from_path(path: &str) -> Option<NaiveDate> {
    let shard = path.strip_prefix("conversations/")?.split('/').next()?;
    NaiveDate::parse_from_str(shard, "%Y-%m-%d").ok()
}

/// Truncate to at most `tokens` worth of characters on a char boundary.
fn truncate_to_tokens(text: &str, tokens: usize) -> &str {
    match text.char_indices().nth(tokens * 4) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;

    /// Build a conversation the way the engine does: keywords from the
    /// exchange, topics from the combined text.
    fn conv(id: &str, question: &str, answer: &str) -> Conversation {
        let keywords =
            analysis::exchange_keywords(question, answer, analysis::DEFAULT_MAX_KEYWORDS);
        let topics = topics::extract_topics(&format!("{question} {answer}"));
        let mut c = Conversation::new(question, answer, None, keywords, topics);
        c.id = id.to_owned();
        c
    }

    fn indexed(conversations: &[&Conversation]) -> MemoryIndex {
        let mut index = MemoryIndex::empty("default");
        for c in conversations {
            index.index_conversation(c, true);
        }
        index
    }

    #[test]
    fn test_full_keyword_match_scores_highest() {
        let jwt = conv(
            "aaaa1111",
            "How do I use JWT authentication?",
            "Sign a token on login and verify it per request.",
        );
        let rust = conv(
            "bbbb2222",
            "Why does the borrow checker complain here?",
            "You are holding two mutable references.",
        );
        let index = indexed(&[&jwt, &rust]);

        let matches = find_relevant(
            "JWT authentication setup",
            &index,
            &RetrievalOptions::default(),
        );
        assert!(!matches.is_empty());
        assert_eq!(matches[0].id, "aaaa1111");
        assert!(matches[0].score > 0.5, "score was {}", matches[0].score);
        assert!(matches[0].path.is_some());
        assert!(!matches.iter().any(|m| m.id == "bbbb2222"));
    }

    #[test]
    fn test_shared_topic_adds_bonus() {
        let jwt = conv(
            "aaaa1111",
            "How do I use JWT authentication?",
            "Sign a token on login.",
        );
        let index = indexed(&[&jwt]);

        // "oauth certificate flow" shares no keywords with the conversation
        // but both classify as security, so the topic bonus alone qualifies.
        let matches = find_relevant(
            "oauth certificate flow",
            &index,
            &RetrievalOptions::default(),
        );
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score >= 0.3);
    }

    #[test]
    fn test_recency_bonus_decays_with_position() {
        let older = conv("aaaa1111", "docker deploy question", "Use a registry.");
        let newer = conv("bbbb2222", "docker deploy question", "Use a registry.");
        let index = indexed(&[&older, &newer]);

        let matches = find_relevant("docker deploy", &index, &RetrievalOptions::default());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "bbbb2222");
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn test_equal_scores_order_by_id() {
        let a = conv("bbbb2222", "docker deploy question", "Use a registry.");
        let b = conv("aaaa1111", "docker deploy question", "Use a registry.");
        let mut index = indexed(&[&a, &b]);
        // Strip the recent list so neither side gets a recency edge.
        index.recent.clear();

        let matches = find_relevant("docker deploy", &index, &RetrievalOptions::default());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "aaaa1111");
        assert_eq!(matches[1].id, "bbbb2222");
    }

    #[test]
    fn test_min_score_filters_weak_matches() {
        let c = conv(
            "aaaa1111",
            "postgres migration ordering",
            "Run them inside one transaction.",
        );
        let index = indexed(&[&c]);

        // One of many query keywords matches; with a high floor it drops.
        let options = RetrievalOptions {
            min_score: 0.9,
            ..Default::default()
        };
        let matches = find_relevant(
            "postgres tuning vacuum autovacuum settings",
            &index,
            &options,
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn test_max_results_caps_output() {
        let conversations: Vec<Conversation> = (0..6)
            .map(|i| {
                conv(
                    &format!("{i:08x}"),
                    "docker deploy question",
                    "Use a registry.",
                )
            })
            .collect();
        let refs: Vec<&Conversation> = conversations.iter().collect();
        let index = indexed(&refs);

        let matches = find_relevant("docker deploy", &index, &RetrievalOptions::default());
        assert_eq!(matches.len(), DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn test_rank_by_relevance_prefers_overlapping_bodies() {
        let vague = conv("aaaa1111", "docker question", "See the manual.");
        let precise = conv(
            "bbbb2222",
            "docker compose volumes misbehaving",
            "Named volumes persist across docker compose restarts.",
        );
        let query_keywords: Vec<String> =
            vec!["docker".into(), "compose".into(), "volumes".into()];

        let mut matches = vec![
            (
                ScoredMatch {
                    id: "aaaa1111".into(),
                    score: 0.5,
                    path: None,
                    summary: None,
                },
                vague,
            ),
            (
                ScoredMatch {
                    id: "bbbb2222".into(),
                    score: 0.5,
                    path: None,
                    summary: None,
                },
                precise,
            ),
        ];
        rank_by_relevance(&mut matches, &query_keywords);
        assert_eq!(matches[0].0.id, "bbbb2222");
        assert!(matches[0].0.score > matches[1].0.score);
    }

    #[test]
    fn test_should_retrieve_gates_short_and_greeting() {
        assert!(!should_retrieve("hi"));
        assert!(!should_retrieve("thanks!"));
        assert!(!should_retrieve("good morning!"));
        assert!(!should_retrieve("who are you?"));
        assert!(!should_retrieve("How are you"));
        assert!(should_retrieve("How do I rotate JWT signing keys?"));
        assert!(should_retrieve("what can you do about flaky tests"));
    }

    #[test]
    fn test_format_context_truncates_with_ellipsis() {
        let mut c = conv("aaaa1111", "Tell me everything about docker", "x");
        c.exchanges[0].answer = "word ".repeat(400);
        let matches = vec![(
            ScoredMatch {
                id: "aaaa1111".into(),
                score: 1.0,
                path: None,
                summary: None,
            },
            c,
        )];

        let block = format_context(&matches, 50);
        assert!(block.starts_with(CONTEXT_HEADER));
        assert!(block.contains("..."));
        assert!(block.ends_with(CONTEXT_FOOTER));
        // Budget holds up to the appended ellipsis.
        assert!(estimate_tokens(&block) <= 55, "got {}", estimate_tokens(&block));
    }

    #[test]
    fn test_format_context_hard_stops_mid_list() {
        let mut c = conv("aaaa1111", "many exchange conversation", "first answer");
        for i in 0..40 {
            c.append(
                &format!("follow-up number {i} with some length to it"),
                "a medium sized answer that consumes budget tokens",
                &[],
                &[],
            );
        }
        let matches = vec![(
            ScoredMatch {
                id: "aaaa1111".into(),
                score: 1.0,
                path: None,
                summary: None,
            },
            c,
        )];

        let block = format_context(&matches, 200);
        assert!(estimate_tokens(&block) <= 200);
        assert!(block.ends_with(CONTEXT_FOOTER));
        // Far fewer than all 41 exchanges fit.
        assert!(block.matches("Q: ").count() < 20);
    }

    #[test]
    fn test_format_context_drops_heading_without_exchanges() {
        let first = conv(
            "aaaa1111",
            "How do I configure the registry mirror?",
            "Set the mirror URL in the daemon config.",
        );
        let second = conv(
            "bbbb2222",
            "How do I rotate JWT signing keys safely?",
            "Publish the new key, accept both, retire the old.",
        );
        let matches = vec![
            (
                ScoredMatch {
                    id: "aaaa1111".into(),
                    score: 1.0,
                    path: None,
                    summary: None,
                },
                first,
            ),
            (
                ScoredMatch {
                    id: "bbbb2222".into(),
                    score: 0.8,
                    path: None,
                    summary: None,
                },
                second,
            ),
        ];

        // Each conversation holds one exchange, so however the budget lands,
        // headings and exchanges come in pairs.
        for budget in 60..=160 {
            let block = format_context(&matches, budget);
            let headings = block.matches("### ").count();
            let exchanges = block.matches("Q: ").count();
            assert!(headings >= 1, "budget {budget} dropped every heading");
            assert_eq!(
                exchanges, headings,
                "budget {budget} left a bare heading:\n{block}"
            );
        }

        // In the hard-stop window the second heading fits but its exchange
        // does not; the whole section goes.
        let tight = format_context(&matches, 75);
        assert_eq!(tight.matches("### ").count(), 1);
        assert!(!tight.contains("JWT"));

        let roomy = format_context(&matches, 150);
        assert_eq!(roomy.matches("### ").count(), 2);
        assert_eq!(roomy.matches("Q: ").count(), 2);
    }

    #[test]
    fn test_search_falls_back_to_recent_for_empty_queries() {
        let a = conv("aaaa1111", "docker deploy question", "Use a registry.");
        let b = conv("bbbb2222", "postgres migration ordering", "One transaction.");
        let index = indexed(&[&a, &b]);

        let results = search("?? !!", &index, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "bbbb2222");
        assert!(results[0].score.is_none());
    }

    #[test]
    fn test_search_scores_and_limits() {
        let a = conv("aaaa1111", "docker deploy question", "Use a registry.");
        let b = conv("bbbb2222", "postgres migration ordering", "One transaction.");
        let index = indexed(&[&a, &b]);

        let results = search("docker registry", &index, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "aaaa1111");
        assert!(results[0].score.unwrap() > 0.0);
        assert_eq!(results[0].date, Some(a.created.date_naive()));
    }

    #[test]
    fn test_context_summary_mentions_topics() {
        let jwt = conv(
            "aaaa1111",
            "How do I use JWT authentication?",
            "Sign a token on login.",
        );
        let matches = vec![(
            ScoredMatch {
                id: "aaaa1111".into(),
                score: 1.0,
                path: None,
                summary: None,
            },
            jwt,
        )];
        let summary = context_summary(&matches);
        assert!(summary.contains("1 past conversation"));
        assert!(summary.contains("security"));
    }

    #[test]
    fn test_date_from_path() {
        assert_eq!(
            date_from_path("conversations/2026-08-25/conv-aaaa1111.md"),
            NaiveDate::from_ymd_opt(2026, 8, 25)
        );
        assert!(date_from_path("somewhere/else.md").is_none());
    }
}
