//! Error types for the conversation context management core.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias using [`ContextError`].
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors the context management core can surface.
///
/// Every variant carries a `context` map of plain string key/value pairs —
/// never raw secrets or tool payloads — so callers can log structured detail
/// without the core needing to know about a particular logging backend.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Malformed input: non-positive budget, headroom out of range, an
    /// empty conversation into the trimmer, or invalid configuration.
    /// Surfaced immediately; never retried.
    #[error("validation error in {component}: {message}")]
    Validation {
        component: String,
        message: String,
        context: BTreeMap<String, String>,
    },

    /// The requested tokenizer could not be constructed. Returned at
    /// counter-construction time, never from a per-call path.
    #[error("tokenizer unavailable: {message}")]
    TokenizerUnavailable {
        message: String,
        context: BTreeMap<String, String>,
    },

    /// Step 3 (LLM digest squeeze) failed. `ContextManager` downgrades this
    /// to a no-op for that step internally; it is not expected to escape
    /// `manage_context`, but remains constructible for direct callers of
    /// `LLMDigestSqueezer`.
    #[error("LLM digest compression failed: {message}")]
    LlmCompressionFailed {
        message: String,
        context: BTreeMap<String, String>,
    },

    /// A read or write to the artifact store failed.
    #[error("artifact store error: {message}")]
    ArtifactStoreFailed {
        message: String,
        context: BTreeMap<String, String>,
    },
}

impl ContextError {
    pub fn validation(
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            component: component.into(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn tokenizer_unavailable(message: impl Into<String>) -> Self {
        Self::TokenizerUnavailable {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn llm_compression_failed(message: impl Into<String>) -> Self {
        Self::LlmCompressionFailed {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn artifact_store_failed(message: impl Into<String>) -> Self {
        Self::ArtifactStoreFailed {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context key/value pair, building up the structured map.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let map = match &mut self {
            ContextError::Validation { context, .. }
            | ContextError::TokenizerUnavailable { context, .. }
            | ContextError::LlmCompressionFailed { context, .. }
            | ContextError::ArtifactStoreFailed { context, .. } => context,
        };
        map.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_component_and_message() {
        let err = ContextError::validation("TokenWindow", "budget must be positive");
        match err {
            ContextError::Validation { component, message, .. } => {
                assert_eq!(component, "TokenWindow");
                assert_eq!(message, "budget must be positive");
            }
            _ => panic!("expected Validation"),
        }
    }

    #[test]
    fn with_context_inserts_into_map() {
        let err = ContextError::artifact_store_failed("write failed")
            .with_context("key", "abc123");
        match err {
            ContextError::ArtifactStoreFailed { context, .. } => {
                assert_eq!(context.get("key").map(String::as_str), Some("abc123"));
            }
            _ => panic!("expected ArtifactStoreFailed"),
        }
    }
}
