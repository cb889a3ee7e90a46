//! # Pending-Generation Cache
//!
//! Generated ticket artifacts keyed by token id, so a retried movement
//! reuses the artwork it already paid to generate and pin. Writes are
//! conditional creates: when two callers race, the first stored value wins
//! and both return it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use choo_core::TokenId;
use choo_state::ArtifactRefs;

use crate::error::StoreError;
use crate::keys;
use crate::kv::{encode, KvStore};

/// Failure in [`ArtifactCache::get_or_create`].
#[derive(Error, Debug)]
pub enum CacheError<E> {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("artifact generation failed: {0}")]
    Generate(E),
}

#[derive(Clone)]
pub struct ArtifactCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The cached artifact for `token_id`, if any.
    pub async fn peek(&self, token_id: TokenId) -> Result<Option<ArtifactRefs>, StoreError> {
        let key = keys::pending_artifact(token_id);
        match self.store.get(&key).await? {
            Some(v) => Ok(Some(v.decode(&key)?)),
            None => Ok(None),
        }
    }

    /// Return the cached artifact, or run `generate` once and cache its result.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        token_id: TokenId,
        generate: F,
    ) -> Result<ArtifactRefs, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArtifactRefs, E>>,
    {
        if let Some(hit) = self.peek(token_id).await? {
            tracing::debug!(token_id = %token_id, "pending artifact cache hit");
            return Ok(hit);
        }

        let generated = generate().await.map_err(CacheError::Generate)?;
        let key = keys::pending_artifact(token_id);
        let stored = self
            .store
            .put_if_absent(&key, encode(&key, &generated)?, Some(self.ttl))
            .await?;
        if stored {
            tracing::info!(
                token_id = %token_id,
                image_hash = %generated.image_hash,
                "cached generated artifact"
            );
            return Ok(generated);
        }

        // Lost the race; the winner's artifact is the one every caller uses.
        match self.peek(token_id).await? {
            Some(winner) => {
                tracing::info!(token_id = %token_id, "concurrent generation won, using stored artifact");
                Ok(winner)
            }
            None => Ok(generated),
        }
    }

    /// Drop the cached artifact. Returns whether one existed.
    pub async fn clear(&self, token_id: TokenId) -> Result<bool, StoreError> {
        self.store.delete(&keys::pending_artifact(token_id)).await
    }
}
