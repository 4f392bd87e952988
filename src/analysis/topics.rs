//! Topic classification over a fixed taxonomy.
//!
//! A conversation is filed under a topic when at least
//! [`MIN_TOPIC_HITS`] distinct members of that topic's keyword set appear in
//! the text. The bar keeps single stray words ("test" in passing) from
//! tagging whole conversations.

use std::collections::HashSet;

use super::tokenize;

/// Distinct keyword-set members required before a topic is assigned.
pub const MIN_TOPIC_HITS: usize = 2;

/// The topic taxonomy. Hand-curated; every term must survive tokenization
/// (lowercase, length > 2).
pub const TOPIC_RULES: &[(&str, &[&str])] = &[
    (
        "security",
        &[
            "auth", "authentication", "authorization", "certificate", "csrf",
            "encryption", "https", "jwt", "login", "oauth", "password",
            "session", "tls", "token", "xss",
        ],
    ),
    (
        "api-design",
        &[
            "api", "endpoint", "graphql", "http", "json", "payload", "request",
            "response", "rest", "route", "versioning", "webhook",
        ],
    ),
    (
        "database",
        &[
            "database", "migration", "mongodb", "mysql", "orm", "postgres",
            "postgresql", "query", "redis", "schema", "sql", "sqlite",
            "transaction",
        ],
    ),
    (
        "frontend",
        &[
            "angular", "browser", "component", "css", "dom", "frontend",
            "html", "javascript", "react", "responsive", "typescript", "vite",
            "vue", "webpack",
        ],
    ),
    (
        "backend",
        &[
            "backend", "cron", "daemon", "microservice", "middleware",
            "nodejs", "process", "queue", "runtime", "server", "service",
            "worker",
        ],
    ),
    (
        "testing",
        &[
            "assert", "coverage", "fixture", "integration", "jest", "mock",
            "pytest", "regression", "tdd", "test", "testing", "unit",
        ],
    ),
    (
        "devops",
        &[
            "ansible", "aws", "cloud", "container", "deploy", "deployment",
            "docker", "kubernetes", "linux", "monitoring", "nginx", "pipeline",
            "terraform",
        ],
    ),
    (
        "performance",
        &[
            "benchmark", "bottleneck", "cache", "caching", "latency", "memory",
            "optimization", "performance", "profiling", "scaling",
            "throughput",
        ],
    ),
    (
        "architecture",
        &[
            "abstraction", "architecture", "coupling", "dependency", "design",
            "modular", "pattern", "refactor", "refactoring", "scalability",
            "structure",
        ],
    ),
    (
        "error-handling",
        &[
            "bug", "crash", "debug", "debugging", "error", "exception",
            "failure", "logging", "panic", "retry", "stack", "timeout",
            "trace",
        ],
    ),
];

/// Topics whose keyword sets have at least [`MIN_TOPIC_HITS`] distinct
/// members in the text. Returned in taxonomy order.
pub fn extract_topics(text: &str) -> Vec<String> {
    let tokens: HashSet<String> = tokenize(text).into_iter().collect();
    let mut topics = Vec::new();
    for (topic, terms) in TOPIC_RULES {
        let hits = terms.iter().filter(|term| tokens.contains(**term)).count();
        if hits >= MIN_TOPIC_HITS {
            topics.push((*topic).to_owned());
        }
    }
    topics
}
