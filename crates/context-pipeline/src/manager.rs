//! C8 — ContextManager: orchestrates ToolDeterministicCompaction →
//! HistoryCompression → LLMHistorySqueeze → FinalTokenTrim, with early exit
//! and per-step telemetry.

use std::sync::Arc;

use context_types::{ArtifactStore, ContextError, Conversation, LLMClient, Result, TokenBudget};
use tracing::{info_span, warn};

use crate::history::{HistoryCompressor, HistoryCompressorConfig};
use crate::squeeze::LLMDigestSqueezer;
use crate::token::TokenCounter;
use crate::tool_output::{ToolOutputCompressor, ToolOutputCompressorConfig};
use crate::window::{TokenWindow, TokenWindowConfig};

/// Per-step diagnostics `ContextManager::manage_context` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStep {
    pub name: &'static str,
    pub tokens_before: u32,
    pub tokens_after: u32,
    pub applied: bool,
}

/// The result of a full `manage_context` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedConversation {
    pub conversation: Conversation,
    pub original_tokens: u32,
    pub final_tokens: u32,
    pub steps: [ContextStep; 4],
}

/// Knobs for every stage, gathered into one constructable, validated
/// struct. Build via [`ContextManagerConfigBuilder`].
#[derive(Debug, Clone, Copy)]
pub struct ContextManagerConfig {
    pub tool_output: ToolOutputCompressorConfig,
    pub history: HistoryCompressorConfig,
    pub window: TokenWindowConfig,
    /// Gates step 3 (LLM squeeze). Forced to `false` when no `LLMClient` is
    /// configured regardless of this value.
    pub squeeze_enabled: bool,
}

impl Default for ContextManagerConfig {
    fn default() -> Self {
        Self {
            tool_output: ToolOutputCompressorConfig::default(),
            history: HistoryCompressorConfig::default(),
            window: TokenWindowConfig::default(),
            squeeze_enabled: true,
        }
    }
}

impl ContextManagerConfig {
    pub fn builder() -> ContextManagerConfigBuilder {
        ContextManagerConfigBuilder::default()
    }
}

/// Validating builder for [`ContextManagerConfig`]. Construction-time
/// validation errors abort construction rather than surfacing on the first
/// `manage_context` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextManagerConfigBuilder {
    config: ContextManagerConfig,
}

impl ContextManagerConfigBuilder {
    pub fn threshold_bytes(mut self, threshold_bytes: usize) -> Self {
        self.config.tool_output.threshold_bytes = threshold_bytes;
        self
    }

    pub fn summary_token_target(mut self, cap_tokens: u32) -> Self {
        self.config.history.cap_tokens = cap_tokens;
        self
    }

    pub fn max_semantic_blocks(mut self, keep_last_k: usize) -> Self {
        self.config.history.keep_last_k = keep_last_k;
        self
    }

    pub fn headroom(mut self, headroom: f32) -> Self {
        self.config.window.headroom = headroom;
        self
    }

    pub fn squeeze_enabled(mut self, enabled: bool) -> Self {
        self.config.squeeze_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<ContextManagerConfig> {
        let config = self.config;
        if config.tool_output.threshold_bytes == 0 {
            return Err(ContextError::validation(
                "ContextManagerConfig",
                "threshold_bytes must be positive",
            ));
        }
        if config.history.cap_tokens == 0 {
            return Err(ContextError::validation(
                "ContextManagerConfig",
                "summary_token_target (cap_tokens) must be positive",
            ));
        }
        if !(0.0..1.0).contains(&config.window.headroom) {
            return Err(ContextError::validation(
                "ContextManagerConfig",
                format!("headroom {} is out of range [0.0, 1.0)", config.window.headroom),
            ));
        }
        Ok(config)
    }
}

/// Orchestrates the four compression stages in strict order.
pub struct ContextManager {
    counter: TokenCounter,
    artifact_store: Arc<dyn ArtifactStore>,
    llm_client: Option<Arc<dyn LLMClient>>,
    config: ContextManagerConfig,
}

impl ContextManager {
    pub fn new(
        counter: TokenCounter,
        artifact_store: Arc<dyn ArtifactStore>,
        llm_client: Option<Arc<dyn LLMClient>>,
        config: ContextManagerConfig,
    ) -> Self {
        Self {
            counter,
            artifact_store,
            llm_client,
            config,
        }
    }

    /// `manage_context(conversation, budget) → managed_conversation`.
    pub async fn manage_context(
        &self,
        conversation: Conversation,
        budget: TokenBudget,
    ) -> Result<ManagedConversation> {
        let original_tokens = self.counter.count_conversation(&conversation);

        let step1 = self.step_tool_compaction(conversation).await;
        let after_step1_tokens = self.counter.count_conversation(&step1.1);

        let step2 = if after_step1_tokens > budget.get() {
            self.step_history_compression(step1.1)
        } else {
            let conv = step1.1;
            let tokens = self.counter.count_conversation(&conv);
            (no_op_step("HistoryCompression", tokens), conv)
        };
        let after_step2_tokens = self.counter.count_conversation(&step2.1);

        let step3 = if after_step2_tokens > budget.get()
            && self.config.squeeze_enabled
            && self.llm_client.is_some()
        {
            self.step_llm_squeeze(step2.1, budget).await
        } else {
            let conv = step2.1;
            let tokens = self.counter.count_conversation(&conv);
            (no_op_step("LLMHistorySqueeze", tokens), conv)
        };

        let step4 = self.step_final_trim(step3.1, budget)?;

        let final_tokens = self.counter.count_conversation(&step4.1);

        Ok(ManagedConversation {
            conversation: step4.1,
            original_tokens,
            final_tokens,
            steps: [step1.0, step2.0, step3.0, step4.0],
        })
    }

    async fn step_tool_compaction(&self, conversation: Conversation) -> (ContextStep, Conversation) {
        let span = info_span!("tool_deterministic_compaction");
        let _guard = span.enter();

        let tokens_before = self.counter.count_conversation(&conversation);
        let cap = tokens_before;
        let compressor =
            ToolOutputCompressor::new(self.artifact_store.clone(), self.capped_tool_output_config(cap));
        let compressed = compressor.compress(conversation.messages()).await;
        let next = Conversation::new(compressed);
        let tokens_after = self.counter.count_conversation(&next);

        (
            finish_step("ToolDeterministicCompaction", tokens_before, tokens_after, &conversation, &next),
            next,
        )
    }

    /// C4's cap is "the current token count" (shrink-only, never inflate);
    /// our `ToolOutputCompressor` only uses `threshold_bytes`, so this
    /// preserves the configured threshold rather than reinterpreting a
    /// token cap as a byte cap — the two units don't mix 1:1, and the
    /// configured byte threshold already enforces shrink-only externalization.
    fn capped_tool_output_config(&self, _current_tokens: u32) -> ToolOutputCompressorConfig {
        self.config.tool_output
    }

    fn step_history_compression(&self, conversation: Conversation) -> (ContextStep, Conversation) {
        let span = info_span!("history_compression");
        let _guard = span.enter();

        let tokens_before = self.counter.count_conversation(&conversation);
        let compressor = HistoryCompressor::new(&self.counter, self.config.history);
        let compressed = compressor.compress(conversation.messages());
        let next = Conversation::new(compressed);
        let tokens_after = self.counter.count_conversation(&next);

        (
            finish_step("HistoryCompression", tokens_before, tokens_after, &conversation, &next),
            next,
        )
    }

    async fn step_llm_squeeze(&self, conversation: Conversation, budget: TokenBudget) -> (ContextStep, Conversation) {
        let span = info_span!("llm_history_squeeze");
        let _guard = span.enter();

        let tokens_before = self.counter.count_conversation(&conversation);
        let Some(client) = self.llm_client.clone() else {
            return (no_op_step("LLMHistorySqueeze", tokens_before), conversation);
        };

        let squeezer = LLMDigestSqueezer::new(&self.counter, client);
        match squeezer.squeeze(conversation.messages(), self.config.history.cap_tokens).await {
            Ok(squeezed) => {
                let next = Conversation::new(squeezed);
                let tokens_after = self.counter.count_conversation(&next);
                (
                    finish_step("LLMHistorySqueeze", tokens_before, tokens_after, &conversation, &next),
                    next,
                )
            }
            Err(err) => {
                warn!(error = %err, budget = budget.get(), "LLM digest squeeze failed, skipping step");
                (no_op_step("LLMHistorySqueeze", tokens_before), conversation)
            }
        }
    }

    fn step_final_trim(&self, conversation: Conversation, budget: TokenBudget) -> Result<(ContextStep, Conversation)> {
        let span = info_span!("final_token_trim");
        let _guard = span.enter();

        let tokens_before = self.counter.count_conversation(&conversation);
        let window = TokenWindow::new(&self.counter, self.config.window);
        let outcome = window.trim_to_budget(&conversation, budget)?;
        let tokens_after = self.counter.count_conversation(&outcome.conversation);

        Ok((
            finish_step("FinalTokenTrim", tokens_before, tokens_after, &conversation, &outcome.conversation),
            outcome.conversation,
        ))
    }
}

fn finish_step(
    name: &'static str,
    tokens_before: u32,
    tokens_after: u32,
    before: &Conversation,
    after: &Conversation,
) -> ContextStep {
    ContextStep {
        name,
        tokens_before,
        tokens_after,
        applied: tokens_after != tokens_before || before.messages() != after.messages(),
    }
}

fn no_op_step(name: &'static str, tokens: u32) -> ContextStep {
    ContextStep {
        name,
        tokens_before: tokens,
        tokens_after: tokens,
        applied: false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use context_types::{Completion, CompletionOptions, Message, Tokenizer};

    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use crate::token::ApproxCharTokenizer;

    struct EchoSqueezeClient;

    #[async_trait]
    impl LLMClient for EchoSqueezeClient {
        async fn complete(&self, conversation: &Conversation, _options: &CompletionOptions) -> Result<Completion> {
            let body = conversation.messages().last().map(|m| m.content().to_string()).unwrap_or_default();
            Ok(Completion {
                content: format!("squeezed: {}", &body[..body.len().min(20)]),
            })
        }
    }

    fn counter() -> TokenCounter {
        TokenCounter::new(Arc::new(ApproxCharTokenizer) as Arc<dyn Tokenizer>).unwrap()
    }

    fn manager(llm_client: Option<Arc<dyn LLMClient>>, config: ContextManagerConfig) -> ContextManager {
        ContextManager::new(counter(), Arc::new(InMemoryArtifactStore::new()), llm_client, config)
    }

    #[tokio::test]
    async fn e1_no_op_under_budget() {
        let mgr = manager(None, ContextManagerConfig::default());
        let conv = Conversation::new(vec![Message::user("hi"), Message::assistant("hello")]);
        let result = mgr.manage_context(conv.clone(), TokenBudget::new(1000).unwrap()).await.unwrap();
        assert_eq!(result.conversation, conv);
        assert!(!result.steps[0].applied);
        assert!(!result.steps[1].applied);
        assert!(!result.steps[2].applied);
    }

    #[tokio::test]
    async fn e2_trim_with_keep_recent_produces_a_history_summary() {
        let config = ContextManagerConfig::builder()
            .summary_token_target(2000)
            .max_semantic_blocks(2)
            .headroom(0.1)
            .build()
            .unwrap();
        let mgr = manager(None, config);
        let mut messages = Vec::new();
        for i in 0..20 {
            messages.push(Message::user(format!("question number {i}")));
            messages.push(Message::assistant(format!("answer number {i}")));
        }
        let conv = Conversation::new(messages);
        let result = mgr.manage_context(conv, TokenBudget::new(80).unwrap()).await.unwrap();
        assert!(result.conversation.messages()[0].is_history_summary());
        assert!(result.final_tokens <= 80);
    }

    #[tokio::test]
    async fn e3_large_tool_output_is_externalized_through_the_manager() {
        let mgr = manager(None, ContextManagerConfig::default());
        let payload = "A".repeat(20_000);
        let conv = Conversation::new(vec![Message::user("fetch it"), Message::tool(payload, "call_1")]);
        let result = mgr.manage_context(conv, TokenBudget::new(5000).unwrap()).await.unwrap();
        let tool_message = result.conversation.messages().iter().find(|m| m.is_tool()).unwrap();
        assert!(tool_message.content().starts_with("[EXTERNALIZED: "));
    }

    #[tokio::test]
    async fn llm_squeeze_runs_only_when_configured_and_still_over_budget() {
        let config = ContextManagerConfig::builder()
            .summary_token_target(1)
            .max_semantic_blocks(1)
            .headroom(0.0)
            .build()
            .unwrap();
        let mgr = manager(Some(Arc::new(EchoSqueezeClient)), config);
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(Message::user(format!("turn {i} has some extra words in it")));
            messages.push(Message::assistant(format!("reply {i} also has some extra words")));
        }
        let conv = Conversation::new(messages);
        let result = mgr.manage_context(conv, TokenBudget::new(40).unwrap()).await.unwrap();
        assert!(result.final_tokens <= 40);
    }

    #[test]
    fn config_builder_rejects_invalid_headroom() {
        let result = ContextManagerConfig::builder().headroom(1.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn config_builder_rejects_zero_cap_tokens() {
        let result = ContextManagerConfig::builder().summary_token_target(0).build();
        assert!(result.is_err());
    }
}
