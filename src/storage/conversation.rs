//! Conversation file codec.
//!
//! A conversation is stored as a single markdown file: a `key: value` header
//! block followed by one `## Exchange N` section per exchange. The format is
//! meant to be readable (and editable) by humans, so decoding is pattern
//! matching over section markers: malformed exchange sections are dropped
//! rather than failing the whole file, and a file whose header is unusable
//! decodes to `None`.

use crate::types::{Conversation, Exchange};

use super::{format_ts, parse_ts};

/// Bumped when the file grammar changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// Render a conversation to its on-disk form.
pub fn encode(conversation: &Conversation) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Conversation conv-{}\n\n", conversation.id));
    out.push_str(&format!("format: {FORMAT_VERSION}\n"));
    out.push_str(&format!("id: {}\n", conversation.id));
    if let Some(session_id) = &conversation.session_id {
        out.push_str(&format!("session_id: {session_id}\n"));
    }
    out.push_str(&format!("created: {}\n", format_ts(conversation.created)));
    out.push_str(&format!("updated: {}\n", format_ts(conversation.updated)));
    out.push_str(&format!("keywords: [{}]\n", conversation.keywords.join(", ")));
    out.push_str(&format!("topics: [{}]\n", conversation.topics.join(", ")));

    for (i, exchange) in conversation.exchanges.iter().enumerate() {
        out.push_str(&format!("\n## Exchange {}\n\n", i + 1));
        out.push_str(&format!("_{}_\n\n", format_ts(exchange.timestamp)));
        out.push_str(exchange.question.trim());
        out.push_str("\n\n**Answer:**\n\n");
        out.push_str(exchange.answer.trim());
        out.push('\n');
        if i + 1 < conversation.exchanges.len() {
            out.push_str("\n---\n");
        }
    }
    out
}

/// Parse a conversation file. Returns `None` when the header is missing
/// required fields, the format version is unknown, or no exchange section
/// survives parsing.
pub fn decode(text: &str) -> Option<Conversation> {
    let (header, body) = match text.find("\n## Exchange ") {
        Some(pos) => (&text[..pos], &text[pos..]),
        None => (text, ""),
    };

    let mut id = None;
    let mut session_id = None;
    let mut created = None;
    let mut updated = None;
    let mut keywords = Vec::new();
    let mut topics = Vec::new();

    for line in header.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "format" => {
                if value.parse::<u32>().is_ok_and(|v| v > FORMAT_VERSION) {
                    return None;
                }
            }
            "id" => id = Some(value.to_owned()),
            "session_id" => session_id = Some(value.to_owned()),
            "created" => created = parse_ts(value),
            "updated" => updated = parse_ts(value),
            "keywords" => keywords = parse_term_list(value),
            "topics" => topics = parse_term_list(value),
            _ => {}
        }
    }

    let sections: Vec<&str> = body.split("\n## Exchange ").skip(1).collect();
    let last = sections.len().saturating_sub(1);
    let exchanges: Vec<Exchange> = sections
        .into_iter()
        .enumerate()
        .filter_map(|(i, section)| parse_exchange(section, i == last))
        .collect();
    if exchanges.is_empty() {
        return None;
    }

    Some(Conversation {
        id: id?,
        session_id,
        created: created?,
        updated: updated?,
        keywords,
        topics,
        exchanges,
    })
}

/// Parse one `## Exchange N` section body: a number line, an `_timestamp_`
/// line, the question, an `**Answer:**` marker, and the answer. Every
/// section except the last carries the `---` separator rule, which is
/// stripped; the last section has no separator, so a trailing rule there is
/// answer text and stays.
fn parse_exchange(section: &str, is_last: bool) -> Option<Exchange> {
    let (_, rest) = section.split_once('\n')?;
    let rest = rest.trim_start();
    let (stamp_line, rest) = rest.split_once('\n')?;
    let stamp = stamp_line.trim().strip_prefix('_')?.strip_suffix('_')?;
    let timestamp = parse_ts(stamp)?;

    let (question, answer) = rest.split_once("**Answer:**")?;
    let question = question.trim();
    let mut answer = answer.trim();
    if !is_last {
        if let Some(stripped) = answer.strip_suffix("---") {
            answer = stripped.trim_end();
        }
    }
    if question.is_empty() || answer.is_empty() {
        return None;
    }

    Some(Exchange {
        timestamp,
        question: question.to_owned(),
        answer: answer.to_owned(),
    })
}

/// Parse `[a, b, c]` into its comma-separated terms.
fn parse_term_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}
