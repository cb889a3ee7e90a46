//! # Staging Store
//!
//! Persistence for [`StagingMovement`] records.
//!
//! ## Concurrency
//!
//! Records are only ever created with a conditional create and only ever
//! changed with a compare-and-swap on the revision that was read. The
//! record's `version` field mirrors the store revision, so a writer holding
//! a stale copy can never overwrite newer progress.
//!
//! ## Promotion
//!
//! [`StagingStore::promote`] writes the durable token record, the
//! last-moved timestamp and the current-holder pointer, and deletes the
//! staging record, in one guarded commit. Nobody observes a durable record
//! without the matching holder pointer, or a staging record next to its
//! durable record.

use std::sync::Arc;
use std::time::Duration;

use choo_core::{Timestamp, TokenId};
use choo_state::{StagingMovement, StagingPatch, TokenRecord, TransitionError};

use crate::error::{StagingError, StoreError};
use crate::keys;
use crate::kv::{encode, KvStore, Transaction, Versioned};

/// Keys fetched per round trip when listing.
const LIST_BATCH: usize = 100;

/// How many times promotion re-reads after losing its guards.
const PROMOTE_ATTEMPTS: u32 = 3;

/// Result of [`StagingStore::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The patch was written; carries the record as stored.
    Applied(StagingMovement),
    /// Every attempt lost to a concurrent writer. Nothing was written.
    Exhausted,
    /// No staging record exists for the token.
    Missing,
    /// The patch's status change is not legal from the stored status.
    Rejected(TransitionError),
}

impl UpdateOutcome {
    pub fn applied(self) -> Option<StagingMovement> {
        match self {
            Self::Applied(record) => Some(record),
            _ => None,
        }
    }
}

/// Result of a successful [`StagingStore::promote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// This call wrote the durable record.
    Promoted(TokenRecord),
    /// A durable record already existed; the leftover staging record was
    /// removed without writing again.
    AlreadyPromoted(TokenId),
}

#[derive(Clone)]
pub struct StagingStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl StagingStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create `record` unless one already exists for its token id.
    ///
    /// Returns whether this call created it. A `false` is not an error; the
    /// caller reads the existing record with [`Self::get`].
    pub async fn create(&self, record: &StagingMovement) -> Result<bool, StoreError> {
        let key = keys::staging(record.token_id);
        let mut fresh = record.clone();
        fresh.version = 1;
        let created = self
            .store
            .put_if_absent(&key, encode(&key, &fresh)?, Some(self.ttl))
            .await?;
        if created {
            tracing::info!(
                token_id = %record.token_id,
                operation_kind = %record.operation_kind,
                "staging record created"
            );
        }
        Ok(created)
    }

    pub async fn get(&self, token_id: TokenId) -> Result<Option<StagingMovement>, StoreError> {
        let key = keys::staging(token_id);
        match self.store.get(&key).await? {
            Some(v) => Ok(Some(Self::decode(&key, &v)?)),
            None => Ok(None),
        }
    }

    fn decode(key: &str, v: &Versioned) -> Result<StagingMovement, StoreError> {
        let mut record: StagingMovement = v.decode(key)?;
        record.version = v.revision;
        Ok(record)
    }

    /// Read, patch and compare-and-swap, retrying on version conflicts up
    /// to `max_retries` times.
    pub async fn update(
        &self,
        token_id: TokenId,
        patch: &StagingPatch,
        max_retries: u32,
    ) -> Result<UpdateOutcome, StoreError> {
        let key = keys::staging(token_id);
        for attempt in 0..=max_retries {
            let Some(current) = self.store.get(&key).await? else {
                return Ok(UpdateOutcome::Missing);
            };
            let mut record = Self::decode(&key, &current)?;
            let from = record.status;
            if let Err(e) = record.apply(patch, Timestamp::now()) {
                tracing::warn!(token_id = %token_id, error = %e, "staging patch rejected");
                return Ok(UpdateOutcome::Rejected(e));
            }
            let swapped = self
                .store
                .compare_and_swap(&key, current.revision, encode(&key, &record)?, Some(self.ttl))
                .await?;
            if swapped {
                if from != record.status {
                    tracing::info!(
                        token_id = %token_id,
                        from = %from,
                        to = %record.status,
                        version = record.version,
                        "staging transition"
                    );
                }
                return Ok(UpdateOutcome::Applied(record));
            }
            tracing::debug!(
                token_id = %token_id,
                attempt,
                "staging version conflict, re-reading"
            );
        }
        tracing::warn!(token_id = %token_id, max_retries, "staging update exhausted retries");
        Ok(UpdateOutcome::Exhausted)
    }

    /// Mark the record `failed` with `reason`. The record is kept for
    /// inspection.
    pub async fn abandon(
        &self,
        token_id: TokenId,
        reason: &str,
        max_retries: u32,
    ) -> Result<UpdateOutcome, StoreError> {
        let outcome = self
            .update(token_id, &StagingPatch::abandoned(reason), max_retries)
            .await?;
        if matches!(outcome, UpdateOutcome::Applied(_)) {
            tracing::warn!(token_id = %token_id, reason, "staging record abandoned");
        }
        Ok(outcome)
    }

    /// Delete the record if it is still at `version`.
    pub async fn discard(&self, token_id: TokenId, version: u64) -> Result<bool, StoreError> {
        let key = keys::staging(token_id);
        let txn = Transaction::new().require_revision(&key, version).delete(&key);
        let removed = self.store.commit(txn).await?;
        if removed {
            tracing::info!(token_id = %token_id, version, "staging record discarded");
        }
        Ok(removed)
    }

    /// Whether `record` has been in flight longer than `threshold` without
    /// completing.
    pub fn is_stuck(&self, record: &StagingMovement, threshold: Duration) -> bool {
        let threshold = chrono::Duration::from_std(threshold)
            .unwrap_or_else(|_| chrono::Duration::days(365_000));
        record.is_stuck(Timestamp::now(), threshold)
    }

    /// Atomically turn a completed staging record into durable state.
    pub async fn promote(&self, token_id: TokenId) -> Result<PromoteOutcome, StagingError> {
        let staging_key = keys::staging(token_id);
        for attempt in 0..PROMOTE_ATTEMPTS {
            let Some(current) = self.store.get(&staging_key).await? else {
                if self.store.get(&keys::token(token_id)).await?.is_some() {
                    return Ok(PromoteOutcome::AlreadyPromoted(token_id));
                }
                return Err(StagingError::NotFound(token_id));
            };
            let staging = Self::decode(&staging_key, &current)?;
            let now = Timestamp::now();
            let record = TokenRecord::from_staging(&staging, now)?;
            let token_key = keys::token(record.token_id);

            if self.store.get(&token_key).await?.is_some() {
                // Crashed between the durable write and the staging delete
                // on an older store, or a concurrent promoter won.
                let txn = Transaction::new()
                    .require_revision(&staging_key, current.revision)
                    .delete(&staging_key);
                if self.store.commit(txn).await? {
                    tracing::warn!(
                        token_id = %token_id,
                        "durable record already present, removed leftover staging record"
                    );
                    return Ok(PromoteOutcome::AlreadyPromoted(record.token_id));
                }
                continue;
            }

            let txn = Transaction::new()
                .require_revision(&staging_key, current.revision)
                .require_absent(&token_key)
                .put(&token_key, encode(&token_key, &record)?, None)
                .put(keys::LAST_MOVED_AT, encode(keys::LAST_MOVED_AT, &now)?, None)
                .put(
                    keys::CURRENT_HOLDER,
                    encode(keys::CURRENT_HOLDER, &record.current_holder())?,
                    None,
                )
                .delete(&staging_key);
            if self.store.commit(txn).await? {
                tracing::info!(
                    token_id = %record.token_id,
                    tx_hash = %record.tx_hash,
                    holder = %record.new_holder.address,
                    "movement promoted"
                );
                return Ok(PromoteOutcome::Promoted(record));
            }
            tracing::debug!(token_id = %token_id, attempt, "promotion guard failed, re-reading");
        }
        Err(StagingError::Contended(token_id))
    }

    /// Every staging record, fetched in batches by cursor. Records that fail
    /// to parse are logged and skipped.
    pub async fn list(&self) -> Result<Vec<StagingMovement>, StoreError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .scan_prefix(keys::STAGING_PREFIX, cursor.as_deref(), LIST_BATCH)
                .await?;
            let values = self.store.get_many(&page.keys).await?;
            for (key, value) in page.keys.iter().zip(values) {
                // Expired between scan and fetch.
                let Some(value) = value else { continue };
                match Self::decode(key, &value) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable staging record"),
                }
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(records)
    }
}
