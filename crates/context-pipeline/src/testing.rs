//! In-memory test doubles for the two injected capabilities, mirroring the
//! teacher workspace's own in-memory doubles. Available under `cfg(test)`
//! and to downstream crates via the `testing` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use context_types::{CompletionOptions, Completion, Conversation, ContextError, LLMClient, Result};

/// A scripted `LLMClient` that returns pre-recorded responses in order, or a
/// canned error, for deterministic pipeline tests.
pub struct ScriptedLLMClient {
    responses: Mutex<Vec<ScriptedResponse>>,
    calls: AtomicUsize,
}

enum ScriptedResponse {
    Text(String),
    Error(String),
}

impl ScriptedLLMClient {
    /// Always answers with `response`, regardless of how many times it is
    /// called.
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(vec![ScriptedResponse::Text(response.into())]),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers with each response in order; the last one repeats once
    /// exhausted.
    pub fn sequence(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(ScriptedResponse::Text).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `message`, to exercise the "skip step 3" path.
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(vec![ScriptedResponse::Error(message.into())]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn complete(&self, _conversation: &Conversation, _options: &CompletionOptions) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().expect("scripted client mutex poisoned");
        let next = if responses.len() > 1 {
            responses.remove(0)
        } else {
            match responses.first() {
                Some(ScriptedResponse::Text(text)) => ScriptedResponse::Text(text.clone()),
                Some(ScriptedResponse::Error(message)) => ScriptedResponse::Error(message.clone()),
                None => ScriptedResponse::Text(String::new()),
            }
        };
        match next {
            ScriptedResponse::Text(content) => Ok(Completion { content }),
            ScriptedResponse::Error(message) => Err(ContextError::llm_compression_failed(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_repeats_the_same_response() {
        let client = ScriptedLLMClient::always("squeezed digest");
        let conv = Conversation::empty();
        let first = client.complete(&conv, &CompletionOptions::default()).await.unwrap();
        let second = client.complete(&conv, &CompletionOptions::default()).await.unwrap();
        assert_eq!(first.content, "squeezed digest");
        assert_eq!(second.content, "squeezed digest");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn sequence_advances_then_repeats_the_last_response() {
        let client = ScriptedLLMClient::sequence(vec!["first".into(), "second".into()]);
        let conv = Conversation::empty();
        let a = client.complete(&conv, &CompletionOptions::default()).await.unwrap();
        let b = client.complete(&conv, &CompletionOptions::default()).await.unwrap();
        let c = client.complete(&conv, &CompletionOptions::default()).await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(c.content, "second");
    }

    #[tokio::test]
    async fn always_failing_returns_llm_compression_failed() {
        let client = ScriptedLLMClient::always_failing("provider unavailable");
        let conv = Conversation::empty();
        let result = client.complete(&conv, &CompletionOptions::default()).await;
        assert!(matches!(result, Err(ContextError::LlmCompressionFailed { .. })));
    }
}
