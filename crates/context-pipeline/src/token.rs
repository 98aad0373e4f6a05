//! C1 — TokenCounter: deterministic token accounting over messages and
//! conversations, delegating tokenization to an injected [`Tokenizer`].

use std::sync::Arc;

use context_types::{ContextError, Conversation, Message, Result, Tokenizer};
use tracing::warn;

/// Fixed per-message overhead, in tokens. Part of the contract — changing
/// this would desynchronize budgets computed upstream of this crate.
const MESSAGE_OVERHEAD: u32 = 4;
/// Fixed per-tool-call overhead, in tokens, on top of its name and
/// arguments tokens.
const TOOL_CALL_OVERHEAD: u32 = 10;
/// Fixed whole-conversation overhead, in tokens.
const CONVERSATION_OVERHEAD: u32 = 10;

/// Which tokenizer family a model name maps to, per the naming convention in
/// the external tokenizer contract. This is a pure classification — it does
/// not construct a real tokenizer (those are out of scope for this crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// `gpt-4o` / `o1-` family.
    A,
    /// `gpt-4` / `gpt-3.5`, and the approximate (±20-30%) fallback used for
    /// Anthropic/Claude/Ollama models and anything unrecognized.
    B,
}

/// Classify a model name into a tokenizer family per the external
/// interfaces contract. Unknown names fall back to `B` with a warning —
/// callers who care about exact tokenization should supply their own
/// `Tokenizer` keyed off a more precise model registry.
pub fn select_tokenizer_kind(model: &str) -> TokenizerKind {
    let normalized = model.to_lowercase();
    if normalized.contains("gpt-4o") || normalized.contains("o1-") {
        TokenizerKind::A
    } else if normalized.contains("gpt-4") || normalized.contains("gpt-3.5") {
        TokenizerKind::B
    } else if normalized.contains("claude")
        || normalized.contains("anthropic")
        || normalized.contains("ollama")
    {
        TokenizerKind::B
    } else {
        warn!(model, "unrecognized model name, falling back to tokenizer B (approximate)");
        TokenizerKind::B
    }
}

/// A deterministic chars/4-style approximation, for tests, examples, and
/// hosts without a calibrated tokenizer available. Documented as a
/// fallback, never as a substitute for a real tokenizer in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxCharTokenizer;

impl Tokenizer for ApproxCharTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        let approx_tokens = text.chars().count().div_ceil(4).max(if text.is_empty() { 0 } else { 1 });
        (0..approx_tokens as u32).collect()
    }
}

/// Reports token counts for a message and a conversation. Pure and
/// deterministic given the injected tokenizer.
pub struct TokenCounter {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenCounter {
    /// The only construction-time failure mode is a tokenizer factory that
    /// cannot produce a tokenizer; once constructed, counting never fails.
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        Ok(Self { tokenizer })
    }

    /// Construct from a fallible tokenizer factory, surfacing
    /// `TokenizerUnavailable` on failure.
    pub fn try_new(
        factory: impl FnOnce() -> std::result::Result<Arc<dyn Tokenizer>, String>,
    ) -> Result<Self> {
        let tokenizer = factory().map_err(ContextError::tokenizer_unavailable)?;
        Ok(Self { tokenizer })
    }

    fn text_tokens(&self, text: &str) -> u32 {
        self.tokenizer.encode(text).len() as u32
    }

    /// `content tokens + per-message overhead (4) + per tool-call
    /// (name_tokens + args_tokens + 10) for assistants + tool_call_id
    /// tokens for tool messages`.
    pub fn count_message(&self, message: &Message) -> u32 {
        let mut total = self.text_tokens(message.content()) + MESSAGE_OVERHEAD;

        for call in message.tool_calls() {
            total += self.text_tokens(&call.name)
                + self.text_tokens(&call.arguments_json)
                + TOOL_CALL_OVERHEAD;
        }

        if let Message::Tool { tool_call_id, .. } = message {
            total += self.text_tokens(tool_call_id);
        }

        total
    }

    /// `Σ count_message + conversation overhead (10)`.
    pub fn count_conversation(&self, conversation: &Conversation) -> u32 {
        conversation
            .messages()
            .iter()
            .map(|m| self.count_message(m))
            .sum::<u32>()
            + CONVERSATION_OVERHEAD
    }

    /// Sum of `count_message` over an arbitrary message slice, without the
    /// whole-conversation overhead. Useful when a stage measures a subset
    /// of messages (e.g. just the digests it produced).
    pub fn count_messages(&self, messages: &[Message]) -> u32 {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_types::ToolCall;

    fn counter() -> TokenCounter {
        TokenCounter::new(Arc::new(ApproxCharTokenizer)).unwrap()
    }

    #[test]
    fn count_message_includes_fixed_overhead() {
        let counter = counter();
        let msg = Message::user("");
        assert_eq!(counter.count_message(&msg), MESSAGE_OVERHEAD);
    }

    #[test]
    fn count_message_adds_tool_call_overhead() {
        let counter = counter();
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "search", "{}")],
        );
        let name_tokens = counter.text_tokens("search");
        let args_tokens = counter.text_tokens("{}");
        let expected = MESSAGE_OVERHEAD + name_tokens + args_tokens + TOOL_CALL_OVERHEAD;
        assert_eq!(counter.count_message(&msg), expected);
    }

    #[test]
    fn count_message_tool_includes_call_id_tokens() {
        let counter = counter();
        let msg = Message::tool("result", "call_abc123");
        let content_tokens = counter.text_tokens("result");
        let id_tokens = counter.text_tokens("call_abc123");
        assert_eq!(
            counter.count_message(&msg),
            content_tokens + MESSAGE_OVERHEAD + id_tokens
        );
    }

    #[test]
    fn count_conversation_adds_conversation_overhead() {
        let counter = counter();
        let conv = Conversation::new(vec![Message::user("hi"), Message::assistant("hello")]);
        let sum: u32 = conv.messages().iter().map(|m| counter.count_message(m)).sum();
        assert_eq!(counter.count_conversation(&conv), sum + CONVERSATION_OVERHEAD);
    }

    #[test]
    fn select_tokenizer_kind_maps_known_families() {
        assert_eq!(select_tokenizer_kind("gpt-4o-mini"), TokenizerKind::A);
        assert_eq!(select_tokenizer_kind("o1-preview"), TokenizerKind::A);
        assert_eq!(select_tokenizer_kind("gpt-4-turbo"), TokenizerKind::B);
        assert_eq!(select_tokenizer_kind("gpt-3.5-turbo"), TokenizerKind::B);
        assert_eq!(select_tokenizer_kind("claude-sonnet-4-5"), TokenizerKind::B);
        assert_eq!(select_tokenizer_kind("ollama/llama3"), TokenizerKind::B);
        assert_eq!(select_tokenizer_kind("some-unknown-model"), TokenizerKind::B);
    }
}
