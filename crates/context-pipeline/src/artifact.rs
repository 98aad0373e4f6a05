//! C5 — the required in-memory `ArtifactStore` implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use context_types::{ArtifactKey, ArtifactStore, ContextError};
use parking_lot::Mutex;

/// Content-addressed key→blob store backed by a `Mutex<HashMap<..>>`.
/// `store` is idempotent: storing the same key twice (necessarily with the
/// same bytes, since the key is the content hash) is a no-op the second
/// time.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<ArtifactKey, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn store(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), ContextError> {
        self.blobs.lock().entry(key.clone()).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, ContextError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, ContextError> {
        Ok(self.blobs.lock().contains_key(key))
    }
}
