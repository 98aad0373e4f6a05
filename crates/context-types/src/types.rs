//! Core types for the conversation context management core.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A tool call emitted by an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments_json: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments_json: arguments_json.into(),
        }
    }
}

/// A single message in a conversation. Closed over four kinds — treat as a
/// sum type, match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Textual content of this message, regardless of kind.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content } => content,
            Message::User { content } => content,
            Message::Assistant { content, .. } => content,
            Message::Tool { content, .. } => content,
        }
    }

    /// Replace this message's content, preserving its kind and any
    /// kind-specific fields (tool_calls / tool_call_id).
    pub fn with_content(&self, new_content: impl Into<String>) -> Self {
        let new_content = new_content.into();
        match self {
            Message::System { .. } => Message::System {
                content: new_content,
            },
            Message::User { .. } => Message::User {
                content: new_content,
            },
            Message::Assistant { tool_calls, .. } => Message::Assistant {
                content: new_content,
                tool_calls: tool_calls.clone(),
            },
            Message::Tool { tool_call_id, .. } => Message::Tool {
                content: new_content,
                tool_call_id: tool_call_id.clone(),
            },
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant { .. })
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Message::Tool { .. })
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// True if this message is a `[HISTORY_SUMMARY]`-prefixed digest.
    pub fn is_history_summary(&self) -> bool {
        self.content().starts_with(HISTORY_SUMMARY_MARKER)
    }
}

/// The exact literal every history-summary message begins with, followed by
/// a newline. Load-bearing: compression idempotence, squeeze selection, and
/// trim pinning all key off this marker.
pub const HISTORY_SUMMARY_MARKER: &str = "[HISTORY_SUMMARY]";

/// Build a `[HISTORY_SUMMARY]`-prefixed digest body.
pub fn wrap_history_summary(body: &str) -> String {
    format!("{HISTORY_SUMMARY_MARKER}\n{body}")
}

/// Strip the `[HISTORY_SUMMARY]\n` header, if present, returning the body.
pub fn strip_history_summary(content: &str) -> &str {
    content
        .strip_prefix(HISTORY_SUMMARY_MARKER)
        .map(|rest| rest.strip_prefix('\n').unwrap_or(rest))
        .unwrap_or(content)
}

/// An ordered, immutable sequence of messages. Every transformation in this
/// crate returns a new `Conversation`; nothing mutates one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Return a new conversation with `tail` appended after this one's
    /// messages.
    pub fn extended(&self, tail: impl IntoIterator<Item = Message>) -> Self {
        let mut messages = self.messages.clone();
        messages.extend(tail);
        Self { messages }
    }

    /// Messages matching a predicate, preserving order.
    pub fn filter(&self, predicate: impl Fn(&Message) -> bool) -> Vec<Message> {
        self.messages.iter().filter(|m| predicate(m)).cloned().collect()
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// A category of structured fact a history digest extracts from a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DigestCategory {
    Identifier,
    Url,
    Constraint,
    StatusCode,
    ErrorMessage,
    Decision,
    ToolUsage,
    Outcome,
}

/// The type a semantic block was grouped as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    UserAssistantPair,
    StandaloneAssistant,
    StandaloneTool,
    Other,
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockType::UserAssistantPair => "UserAssistantPair",
            BlockType::StandaloneAssistant => "StandaloneAssistant",
            BlockType::StandaloneTool => "StandaloneTool",
            BlockType::Other => "Other",
        };
        f.write_str(s)
    }
}

/// Opaque identifier for a semantic block. Random per construction; two
/// blocks with identical content still get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(uuid::Uuid);

impl BlockId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A contiguous group of messages forming one logical turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticBlock {
    pub id: BlockId,
    pub block_type: BlockType,
    pub messages: Vec<Message>,
    pub expecting_assistant: bool,
}

/// A bounded, deterministic summary of one or more semantic blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDigest {
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub content: String,
    pub original_tokens_estimate: u32,
}

/// Content-addressed key for an externalized artifact: the lowercase hex
/// SHA-256 digest of the stored bytes. `of` is idempotent — identical bytes
/// always yield the identical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Derive the content-addressed key for some bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex_encode(&digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to String never fails");
    }
    out
}

/// Detected content type of an externalized or inline-compressed tool
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Json,
    Yaml,
    Log,
    Error,
    Binary,
    Text,
}

impl ContentType {
    /// Upper-case tag used in the `[EXTERNALIZED: ...]` pointer format.
    pub fn as_tag(&self) -> &'static str {
        match self {
            ContentType::Json => "JSON",
            ContentType::Yaml => "YAML",
            ContentType::Log => "LOG",
            ContentType::Error => "ERROR",
            ContentType::Binary => "BINARY",
            ContentType::Text => "TEXT",
        }
    }
}

/// Record of a tool payload that was moved to content-addressed storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalizedContent {
    pub key: ArtifactKey,
    pub size_bytes: usize,
    pub content_type: ContentType,
    pub summary: String,
}

impl ExternalizedContent {
    /// Render the `[EXTERNALIZED: <key> | <TYPE> | <summary>]` pointer that
    /// replaces the original tool message content.
    pub fn pointer(&self) -> String {
        format!(
            "[EXTERNALIZED: {} | {} | {}]",
            self.key,
            self.content_type.as_tag(),
            self.summary
        )
    }
}

/// A positive token budget in whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget(u32);

impl TokenBudget {
    /// `None` if `tokens` is zero — a budget must be positive.
    pub fn new(tokens: u32) -> Option<Self> {
        if tokens == 0 {
            None
        } else {
            Some(Self(tokens))
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// A fractional safety margin in `[0.0, 1.0)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadroomPercent(f32);

impl HeadroomPercent {
    /// `None` if `fraction` is outside `[0.0, 1.0)`.
    pub fn new(fraction: f32) -> Option<Self> {
        if (0.0..1.0).contains(&fraction) {
            Some(Self(fraction))
        } else {
            None
        }
    }

    pub fn get(&self) -> f32 {
        self.0
    }

    /// `⌊budget × (1 − headroom)⌋`.
    pub fn apply(&self, budget: TokenBudget) -> u32 {
        ((budget.get() as f64) * (1.0 - self.0 as f64)).floor() as u32
    }
}
