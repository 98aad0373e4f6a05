//! Capability traits the pipeline is built against: a tokenizer, an LLM
//! client, and an artifact store. All three are injected at construction;
//! none of them is implemented by this crate beyond the small in-memory /
//! approximate doubles needed for tests (see `context-pipeline`'s `testing`
//! module).

use async_trait::async_trait;

use crate::error::ContextError;
use crate::types::{ArtifactKey, Conversation};

/// `encode(text) → token ids`. Only the length of the returned sequence is
/// ever consumed — real tokenizer implementations (BPE, SentencePiece, ...)
/// are an external collaborator, not part of this crate's contract.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
}

/// Fixed options passed alongside a completion request. The core never
/// inspects these beyond passing them through; only `LLMDigestSqueezer`
/// calls `complete` today, always with default options.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// What an `LLMClient` returns for a completed (non-streaming) request.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
}

/// `complete(conversation, options) → completion`. The core only ever
/// drives this with a two-message conversation (system + user) inside the
/// digest squeezer; streaming, reasoning, and cost accounting are
/// irrelevant to the contract.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion, ContextError>;
}

/// A content-addressed key→blob store for externalized tool outputs.
/// `store(k, v)` must be idempotent when `k = hash(v)`; `retrieve` returns
/// exactly what was stored. No TTL is specified — implementations may
/// persist indefinitely or evict on their own policy.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), ContextError>;
    async fn retrieve(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, ContextError>;
    async fn exists(&self, key: &ArtifactKey) -> Result<bool, ContextError>;
}
