//! context-types: core message, conversation, and capability types shared
//! by the conversation context management pipeline.
//!
//! This crate defines the data model (`Message`, `Conversation`,
//! `SemanticBlock`, `HistoryDigest`, `ArtifactKey`, ...) and the three
//! capability traits the pipeline is built against (`Tokenizer`,
//! `LLMClient`, `ArtifactStore`). It has no opinion on how those
//! capabilities are implemented — a real tokenizer, a provider HTTP client,
//! and an S3-backed artifact store are all external collaborators.

pub mod capability;
pub mod error;
pub mod types;

pub use capability::{ArtifactStore, CompletionOptions, Completion, LLMClient, Tokenizer};
pub use error::{ContextError, Result};
pub use types::*;
