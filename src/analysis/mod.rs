//! Lexical text analysis: tokenization, stop-word filtering, keyword
//! extraction, and keyword-set similarity.
//!
//! Everything here is pure and deterministic. The same text always produces
//! the same tokens, keywords, and topics, so index contents are reproducible
//! from the conversation files alone.

pub mod topics;

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Default cap on extracted keywords per text.
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

/// Common English stop words plus conversational filler, removed before
/// keyword counting.
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "for", "from", "get",
    "got", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "like",
    "me", "more", "most", "my", "no", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "out", "over", "own", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until",
    "up", "use", "used", "using", "very", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "why", "will", "with", "would", "you",
    "your", "yours",
    // Conversational filler that carries no retrieval signal.
    "answer", "help", "hello", "know", "need", "please", "question", "tell",
    "thank", "thanks", "want", "way",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Split text into lowercase tokens over `[a-z0-9\-_]`. Every other
/// character becomes whitespace; tokens of length <= 2 are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(str::to_owned)
        .collect()
}

/// Top `max` non-stop-word tokens by descending frequency. Ties resolve in
/// first-encounter order, so extraction is stable for a given text.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, token) in tokenize(text).into_iter().enumerate() {
        if stop_words().contains(token.as_str()) {
            continue;
        }
        let entry = counts.entry(token).or_insert((0, position));
        entry.0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.truncate(max);
    ranked.into_iter().map(|(token, _)| token).collect()
}

/// Keywords for a full exchange. The question is counted twice so its terms
/// outweigh answer terms of equal frequency.
pub fn exchange_keywords(question: &str, answer: &str, max: usize) -> Vec<String> {
    extract_keywords(&format!("{question} {question} {answer}"), max)
}

/// Jaccard similarity between two keyword sets, in `[0.0, 1.0]`.
pub fn keyword_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Collapse whitespace and truncate to `max_chars`, appending `...` when cut.
/// Used for summary lines in the index.
pub fn condense(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
