//! # Metadata Retry Queue
//!
//! Tokens whose on-chain metadata write failed after the movement was
//! already committed. Each entry lives under `metadata-retry:{id}` with a
//! bounded retention TTL and is indexed in the `metadata-retry:pending`
//! set. Entry and index are always written in the same commit.
//!
//! An entry that expires before it is repaired is dropped. The metadata is
//! cosmetic, so that loss is accepted.

use std::sync::Arc;
use std::time::Duration;

use choo_core::TokenId;
use choo_state::MetadataRetryEntry;

use crate::error::StoreError;
use crate::keys;
use crate::kv::{encode, KvStore, Transaction};

const ENQUEUE_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct MetadataRetryQueue {
    store: Arc<dyn KvStore>,
    retention: Duration,
}

impl MetadataRetryQueue {
    pub fn new(store: Arc<dyn KvStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Insert or refresh the entry for `entry.token_id`.
    ///
    /// An existing entry keeps its `first_failed_at`; its attempt counter
    /// is carried forward. Returns the entry as stored.
    pub async fn enqueue(
        &self,
        entry: MetadataRetryEntry,
    ) -> Result<MetadataRetryEntry, StoreError> {
        let key = keys::metadata_retry(entry.token_id);
        let member = entry.token_id.to_string();
        for _ in 0..ENQUEUE_ATTEMPTS {
            let existing = self.store.get(&key).await?;
            let (stored, txn) = match &existing {
                Some(v) => {
                    let merged = match v.decode::<MetadataRetryEntry>(&key) {
                        Ok(prev) => entry.clone().merged_over(&prev),
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "replacing unreadable retry entry");
                            entry.clone()
                        }
                    };
                    (merged, Transaction::new().require_revision(&key, v.revision))
                }
                None => (entry.clone(), Transaction::new().require_absent(&key)),
            };
            let txn = txn
                .put(&key, encode(&key, &stored)?, Some(self.retention))
                .set_add(keys::METADATA_RETRY_PENDING, &member);
            if self.store.commit(txn).await? {
                tracing::info!(
                    token_id = %stored.token_id,
                    attempts = stored.attempts,
                    first_failed_at = %stored.first_failed_at,
                    "metadata retry enqueued"
                );
                return Ok(stored);
            }
        }
        Err(StoreError::Contended {
            key,
            attempts: ENQUEUE_ATTEMPTS,
        })
    }

    pub async fn get(&self, token_id: TokenId) -> Result<Option<MetadataRetryEntry>, StoreError> {
        let key = keys::metadata_retry(token_id);
        match self.store.get(&key).await? {
            Some(v) => Ok(Some(v.decode(&key)?)),
            None => Ok(None),
        }
    }

    /// Every live entry, oldest token id first. Index members whose entry
    /// expired are pruned from the set.
    pub async fn pending(&self) -> Result<Vec<MetadataRetryEntry>, StoreError> {
        let mut ids: Vec<TokenId> = Vec::new();
        for member in self.store.set_members(keys::METADATA_RETRY_PENDING).await? {
            match member.parse::<TokenId>() {
                Ok(id) => ids.push(id),
                Err(_) => {
                    tracing::warn!(member = %member, "dropping malformed retry index member");
                    self.store
                        .set_remove(keys::METADATA_RETRY_PENDING, &member)
                        .await?;
                }
            }
        }
        ids.sort();

        let entry_keys: Vec<String> = ids.iter().map(|id| keys::metadata_retry(*id)).collect();
        let values = self.store.get_many(&entry_keys).await?;

        let mut entries = Vec::with_capacity(values.len());
        for ((id, key), value) in ids.iter().zip(&entry_keys).zip(values) {
            match value {
                Some(v) => match v.decode::<MetadataRetryEntry>(key) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable retry entry"),
                },
                None => {
                    tracing::debug!(token_id = %id, "retry entry expired, pruning index");
                    self.store
                        .set_remove(keys::METADATA_RETRY_PENDING, &id.to_string())
                        .await?;
                }
            }
        }
        Ok(entries)
    }

    /// Drop the entry and its index member. Returns whether an entry existed.
    pub async fn remove(&self, token_id: TokenId) -> Result<bool, StoreError> {
        let key = keys::metadata_retry(token_id);
        let existed = self.store.get(&key).await?.is_some();
        let txn = Transaction::new()
            .delete(&key)
            .set_remove(keys::METADATA_RETRY_PENDING, token_id.to_string());
        self.store.commit(txn).await?;
        if existed {
            tracing::info!(token_id = %token_id, "metadata retry entry removed");
        }
        Ok(existed)
    }
}
