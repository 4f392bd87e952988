//! Index file codec, plus the session-map sidecar.
//!
//! The index is one markdown file: a metadata header, a `## Topics` section
//! (one H3 per topic with link lines), a `## Keywords` section (one posting
//! line per keyword), and a `## Recent Conversations` section (numbered
//! entries). Lines are matched against strict per-section grammars;
//! anything that does not match is silently skipped, so a hand-edited or
//! partially damaged index degrades instead of failing.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::types::{MemoryIndex, RecentEntry, TopicEntry};

use super::{format_ts, parse_ts, SessionEntry, SessionMap};

/// Bumped when the index grammar changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

fn topic_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^- \[([^\]]+)\]\(([^)]+)\)\s*(.*)$").expect("topic line regex must compile")
    })
}

fn keyword_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^- ([a-z0-9_-]+):\s*(.*)$").expect("keyword line regex must compile")
    })
}

fn recent_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\d+\.\s+\[(\d{4}-\d{2}-\d{2})\]\s+(\S+)\s+-\s+(.*)\s+\(keywords:\s*([^()]*)\)\s+-\s+path:\s+(\S+)$",
        )
        .expect("recent line regex must compile")
    })
}

fn session_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^- (.+): (\S+) \((\S+)\)$").expect("session line regex must compile")
    })
}

/// Render an index to its on-disk form. Topic and keyword sections come out
/// sorted (the maps are ordered), recent entries in list order.
pub fn encode(index: &MemoryIndex) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Memory Index: {}\n\n", index.instance));
    out.push_str(&format!("format: {FORMAT_VERSION}\n"));
    if let Some(ts) = index.last_updated {
        out.push_str(&format!("last_updated: {}\n", format_ts(ts)));
    }
    out.push_str(&format!(
        "total_conversations: {}\n",
        index.total_conversations
    ));

    out.push_str("\n## Topics\n");
    for (topic, entries) in &index.topics {
        out.push_str(&format!("\n### {topic}\n\n"));
        for entry in entries {
            out.push_str(&format!("- [{}]({}) {}\n", entry.id, entry.path, entry.summary));
        }
    }

    out.push_str("\n## Keywords\n\n");
    for (keyword, ids) in &index.keywords {
        out.push_str(&format!("- {keyword}: {}\n", ids.join(", ")));
    }

    out.push_str("\n## Recent Conversations\n\n");
    for (i, entry) in index.recent.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} - {} (keywords: {}) - path: {}\n",
            i + 1,
            entry.date.format("%Y-%m-%d"),
            entry.id,
            entry.summary,
            entry.keywords.join(", "),
            entry.path,
        ));
    }
    out
}

#[derive(PartialEq)]
enum Section {
    Preamble,
    Topics,
    Keywords,
    Recent,
}

/// Parse an index file. Never fails: unrecognized lines are skipped, and a
/// file from an unknown future format decodes to an empty index.
pub fn decode(text: &str, instance: &str) -> MemoryIndex {
    let mut index = MemoryIndex::empty(instance);
    let mut section = Section::Preamble;
    let mut current_topic: Option<String> = None;
    let mut total: u64 = 0;

    for line in text.lines() {
        match line {
            "## Topics" => {
                section = Section::Topics;
                continue;
            }
            "## Keywords" => {
                section = Section::Keywords;
                continue;
            }
            "## Recent Conversations" => {
                section = Section::Recent;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Preamble => {
                let Some((key, value)) = line.split_once(':') else {
                    continue;
                };
                let value = value.trim();
                match key.trim() {
                    "format" => {
                        if value.parse::<u32>().is_ok_and(|v| v > FORMAT_VERSION) {
                            tracing::warn!(
                                format = value,
                                "Index file written by a newer version, starting empty"
                            );
                            return MemoryIndex::empty(instance);
                        }
                    }
                    "last_updated" => index.last_updated = parse_ts(value),
                    "total_conversations" => total = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
            Section::Topics => {
                if let Some(topic) = line.strip_prefix("### ") {
                    current_topic = Some(topic.trim().to_owned());
                } else if let (Some(topic), Some(caps)) =
                    (&current_topic, topic_line_re().captures(line))
                {
                    index.topics.entry(topic.clone()).or_default().push(TopicEntry {
                        id: caps[1].to_owned(),
                        path: caps[2].to_owned(),
                        summary: caps[3].to_owned(),
                    });
                }
            }
            Section::Keywords => {
                if let Some(caps) = keyword_line_re().captures(line) {
                    let ids: Vec<String> = caps[2]
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_owned)
                        .collect();
                    if !ids.is_empty() {
                        index.keywords.insert(caps[1].to_owned(), ids);
                    }
                }
            }
            Section::Recent => {
                let Some(caps) = recent_line_re().captures(line) else {
                    continue;
                };
                let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") else {
                    continue;
                };
                index.recent.push(RecentEntry {
                    date,
                    id: caps[2].to_owned(),
                    summary: caps[3].trim().to_owned(),
                    keywords: caps[4]
                        .split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_owned)
                        .collect(),
                    path: caps[5].to_owned(),
                });
            }
        }
    }

    // The running counter can never trail the recent list.
    index.total_conversations = total.max(index.recent.len() as u64);
    index
}

/// Render the session-map sidecar.
pub fn encode_sessions(instance: &str, sessions: &SessionMap) -> String {
    let mut out = format!("# Sessions: {instance}\n\n");
    for (session, entry) in sessions {
        out.push_str(&format!(
            "- {session}: {} ({})\n",
            entry.conversation_id, entry.path
        ));
    }
    out
}

/// Parse the session-map sidecar. Unmatched lines are skipped.
pub fn decode_sessions(text: &str) -> SessionMap {
    let mut sessions = SessionMap::new();
    for line in text.lines() {
        if let Some(caps) = session_line_re().captures(line) {
            sessions.insert(
                caps[1].to_owned(),
                SessionEntry {
                    conversation_id: caps[2].to_owned(),
                    path: caps[3].to_owned(),
                },
            );
        }
    }
    sessions
}
