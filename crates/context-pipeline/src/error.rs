//! Error handling for the pipeline crate.
//!
//! The taxonomy itself (`ContextError` and its four kinds) lives in
//! `context-types` since `ArtifactStore` and `LLMClient` — the traits that
//! can actually fail — are defined there too. This module just re-exports
//! the alias pipeline modules use.

pub use context_types::{ContextError, Result};
