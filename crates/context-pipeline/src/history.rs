//! C3 — HistoryCompressor: replace older semantic blocks with deterministic
//! `[HISTORY_SUMMARY]` digests, capped by tokens.

use std::sync::LazyLock;

use context_types::{
    BlockType, DigestCategory, HistoryDigest, Message, SemanticBlock, strip_history_summary,
    wrap_history_summary,
};
use regex::Regex;

use crate::blocks::group_into_blocks;
use crate::token::TokenCounter;

/// Parameters `HistoryCompressor::compress` is called with.
#[derive(Debug, Clone, Copy)]
pub struct HistoryCompressorConfig {
    /// Token cap for the emitted digest messages combined (not counting
    /// `recent`). If exceeded, digests are consolidated into one and
    /// character-truncated instead.
    pub cap_tokens: u32,
    /// Number of trailing semantic blocks kept verbatim.
    pub keep_last_k: usize,
}

impl Default for HistoryCompressorConfig {
    fn default() -> Self {
        Self {
            cap_tokens: 2000,
            keep_last_k: 3,
        }
    }
}

/// Canonical case-insensitive regex catalog for digest extraction, compiled
/// once. Order is the tie-break order for matches within a category.
static DIGEST_PATTERNS: LazyLock<Vec<(DigestCategory, Regex)>> = LazyLock::new(|| {
    [
        (
            DigestCategory::Identifier,
            r"(?i)\b(id|identifier|uuid|key|ref(erence)?)[:\s=]+([a-zA-Z0-9\-_]+)",
        ),
        (
            DigestCategory::Url,
            r#"(?i)(https?://|www\.)[^\s<>"'{|}|\\^`\[\]]+"#,
        ),
        (
            DigestCategory::Constraint,
            r"(?i)(must|should|cannot|required?|forbidden|allowed)[^.!?]*[.!?]",
        ),
        (
            DigestCategory::StatusCode,
            r"(?i)(status|code|error)[:\s]+(\d{3,4})",
        ),
        (
            DigestCategory::ErrorMessage,
            r"(?i)(error|exception|failed?|denied)[^.!?]*[.!?]",
        ),
        (
            DigestCategory::Decision,
            r"(?i)(decided|chosen|selected|determined)[^.!?]*[.!?]",
        ),
        (
            DigestCategory::ToolUsage,
            r"(?i)(tool|function|api|call)(ed|ing)?[^.!?]*[.!?]",
        ),
        (
            DigestCategory::Outcome,
            r"(?i)(result|outcome|conclusion|success|completed?)[^.!?]*[.!?]",
        ),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).expect("static pattern is valid")))
    .collect()
});

/// Per-category cap on extracted matches and the label used in the
/// formatted digest line.
fn category_limit_and_label(category: DigestCategory) -> (usize, &'static str) {
    match category {
        DigestCategory::Identifier => (3, "IDs"),
        DigestCategory::Url => (2, "URLs"),
        DigestCategory::Constraint => (2, "Rules"),
        DigestCategory::StatusCode => (2, "Status"),
        DigestCategory::ErrorMessage => (2, "Error"),
        DigestCategory::Decision => (2, "Decision"),
        DigestCategory::ToolUsage => (2, "Tools"),
        DigestCategory::Outcome => (2, "Result"),
    }
}

/// The slice of a match that represents its "value" — for identifier and
/// status-code matches that's the trailing captured value (`abc-123`, `500`),
/// not the leading keyword (`id:`, `status:`); every other category reads as
/// a full descriptive fragment, so the whole match is the value.
fn match_value<'t>(category: DigestCategory, captures: &regex::Captures<'t>) -> &'t str {
    match category {
        DigestCategory::Identifier => captures.get(3).map(|m| m.as_str()).unwrap_or_else(|| captures.get(0).unwrap().as_str()),
        DigestCategory::StatusCode => captures.get(2).map(|m| m.as_str()).unwrap_or_else(|| captures.get(0).unwrap().as_str()),
        _ => captures.get(0).unwrap().as_str(),
    }
}

/// Extract up to the per-category cap of deduplicated matches, in
/// left-to-right order, for one category over the joined block text.
fn extract_category(text: &str, category: DigestCategory, pattern: &Regex) -> Vec<String> {
    let (limit, _) = category_limit_and_label(category);
    let mut seen = Vec::new();
    for captures in pattern.captures_iter(text) {
        let matched = match_value(category, &captures).trim().to_string();
        if !seen.contains(&matched) {
            seen.push(matched);
        }
        if seen.len() >= limit {
            break;
        }
    }
    seen
}

fn format_piece(category: DigestCategory, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let (_, label) = category_limit_and_label(category);
    match category {
        DigestCategory::ToolUsage => Some(format!("{label}[{} used]", values.len())),
        DigestCategory::Url => Some(format!("{label}[{}]", values.len())),
        _ => Some(format!("{label}[{}]", values.join(","))),
    }
}

/// Build the one-line structured digest string for a single block.
fn format_digest_line(block_type: BlockType, joined: &str) -> String {
    let mut pieces = Vec::new();
    for (category, pattern) in DIGEST_PATTERNS.iter() {
        let matches = extract_category(joined, *category, pattern);
        if let Some(piece) = format_piece(*category, &matches) {
            pieces.push(piece);
        }
    }

    if pieces.is_empty() {
        format!("{block_type}: (no key info extracted)")
    } else {
        format!("{block_type}: {}", pieces.join(" "))
    }
}

fn join_block_text(block: &SemanticBlock) -> String {
    block
        .messages
        .iter()
        .map(Message::content)
        .collect::<Vec<_>>()
        .join("\n")
}

fn digest_for_block(block: &SemanticBlock, counter: &TokenCounter) -> HistoryDigest {
    let joined = join_block_text(block);
    let content = format_digest_line(block.block_type, &joined);
    HistoryDigest {
        block_id: block.id,
        block_type: block.block_type,
        content,
        original_tokens_estimate: counter.count_messages(&block.messages),
    }
}

/// Deterministic, budget-capped compression of older conversation history
/// into `[HISTORY_SUMMARY]` messages.
pub struct HistoryCompressor<'a> {
    counter: &'a TokenCounter,
    config: HistoryCompressorConfig,
}

impl<'a> HistoryCompressor<'a> {
    pub fn new(counter: &'a TokenCounter, config: HistoryCompressorConfig) -> Self {
        Self { counter, config }
    }

    /// `compress_to_digest` — see module docs.
    pub fn compress(&self, messages: &[Message]) -> Vec<Message> {
        if messages.iter().any(Message::is_history_summary) {
            return messages.to_vec();
        }

        let all_blocks = group_into_blocks(messages);
        let keep = self.config.keep_last_k.min(all_blocks.len());
        let split_at = all_blocks.len() - keep;
        let (older, recent) = all_blocks.split_at(split_at);

        if older.is_empty() {
            return messages.to_vec();
        }

        let digests: Vec<HistoryDigest> =
            older.iter().map(|block| digest_for_block(block, self.counter)).collect();

        let digest_messages: Vec<Message> = digests
            .iter()
            .map(|d| Message::system(wrap_history_summary(&d.content)))
            .collect();

        let recent_messages: Vec<Message> =
            recent.iter().flat_map(|b| b.messages.clone()).collect();

        if self.counter.count_messages(&digest_messages) <= self.config.cap_tokens {
            let mut out = digest_messages;
            out.extend(recent_messages);
            return out;
        }

        let consolidated = digests
            .iter()
            .enumerate()
            .map(|(i, d)| format!("Block{}: {}", i + 1, d.content))
            .collect::<Vec<_>>()
            .join("; ");

        let max_chars = (self.config.cap_tokens as usize) * 4;
        let truncated = if consolidated.chars().count() > max_chars {
            let mut truncated: String = consolidated.chars().take(max_chars).collect();
            truncated.push('…');
            truncated
        } else {
            consolidated
        };

        let mut out = vec![Message::system(wrap_history_summary(&truncated))];
        out.extend(recent_messages);
        out
    }
}
