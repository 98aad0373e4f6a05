//! C6 — LLMDigestSqueezer: an optional LLM-assisted second pass that
//! compresses only `[HISTORY_SUMMARY]` messages, when they still don't fit
//! the cap after deterministic compression.

use std::sync::Arc;

use context_types::{
    CompletionOptions, Conversation, LLMClient, Message, Result, strip_history_summary,
    wrap_history_summary,
};

use crate::token::TokenCounter;

/// Fixed system prompt steering the LLM toward a tighter digest while
/// preserving the structured facts a digest exists to carry.
const DIGEST_SQUEEZE_SYSTEM_PROMPT: &str = "\
You compress a history digest for an AI agent's conversation context. The \
digest you are given already summarizes one or more earlier conversation \
turns. Produce a tighter version of it that preserves every identifier, \
URL, status code, error message, decision, and tool-usage fact it contains. \
Do not add new information. Respond with only the compressed digest text.";

/// Optional LLM-assisted compression pass over `[HISTORY_SUMMARY]` messages.
pub struct LLMDigestSqueezer<'a> {
    counter: &'a TokenCounter,
    client: Arc<dyn LLMClient>,
}

impl<'a> LLMDigestSqueezer<'a> {
    pub fn new(counter: &'a TokenCounter, client: Arc<dyn LLMClient>) -> Self {
        Self { counter, client }
    }

    /// `squeeze_digest` — see module docs. Fails the whole operation if any
    /// LLM call fails; the caller (`ContextManager`) downgrades that to
    /// "skip this step".
    pub async fn squeeze(&self, messages: &[Message], cap_tokens: u32) -> Result<Vec<Message>> {
        let digest_count = messages.iter().filter(|m| m.is_history_summary()).count();
        if digest_count == 0 {
            return Ok(messages.to_vec());
        }

        let digest_tokens: u32 = self.counter.count_messages(
            &messages
                .iter()
                .filter(|m| m.is_history_summary())
                .cloned()
                .collect::<Vec<_>>(),
        );
        if digest_tokens <= cap_tokens {
            return Ok(messages.to_vec());
        }

        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            if message.is_history_summary() {
                out.push(self.squeeze_one(message).await?);
            } else {
                out.push(message.clone());
            }
        }
        Ok(out)
    }

    async fn squeeze_one(&self, message: &Message) -> Result<Message> {
        let body = strip_history_summary(message.content());
        let request = Conversation::new(vec![
            Message::system(DIGEST_SQUEEZE_SYSTEM_PROMPT),
            Message::user(body),
        ]);

        let completion = self.client.complete(&request, &CompletionOptions::default()).await?;
        Ok(message.with_content(wrap_history_summary(&completion.content)))
    }
}
