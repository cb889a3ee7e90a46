//! # Key-Value Abstraction
//!
//! The primitives every higher-level component is built on. Each operation
//! is a single atomic step on the backend; nothing above this layer holds a
//! lock across an `.await`.
//!
//! ## Revisions
//!
//! Every live key carries a revision. A fresh key starts at 1 and every
//! write bumps it by one. A key that expired and is written again starts
//! over at 1. Compare-and-swap and [`Guard::Revision`] compare against this
//! number.
//!
//! ## Expiry
//!
//! Keys written with a TTL become invisible to every read once it elapses.
//! Backends may reclaim the storage lazily; [`KvStore::purge_expired`]
//! forces it.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// A stored value and its current revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: Value,
    pub revision: u64,
}

impl Versioned {
    /// Deserialize the value, attributing failures to `key`.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        decode(key, &self.value)
    }
}

/// A precondition on a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The key is live at exactly this revision.
    Revision { key: String, revision: u64 },
    /// The key is absent or expired.
    Absent { key: String },
}

/// One write inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        key: String,
        value: Value,
        ttl: Option<Duration>,
    },
    Delete {
        key: String,
    },
    SetAdd {
        set: String,
        member: String,
    },
    SetRemove {
        set: String,
        member: String,
    },
}

/// A guarded multi-key write. Either every guard holds and every op is
/// applied, or nothing is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub guards: Vec<Guard>,
    pub ops: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_revision(mut self, key: impl Into<String>, revision: u64) -> Self {
        self.guards.push(Guard::Revision {
            key: key.into(),
            revision,
        });
        self
    }

    pub fn require_absent(mut self, key: impl Into<String>) -> Self {
        self.guards.push(Guard::Absent { key: key.into() });
        self
    }

    pub fn put(mut self, key: impl Into<String>, value: Value, ttl: Option<Duration>) -> Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn set_add(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetAdd {
            set: set.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_remove(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetRemove {
            set: set.into(),
            member: member.into(),
        });
        self
    }
}

/// One page of a prefix scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Live keys in ascending order.
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` when the scan is complete.
    pub next: Option<String>,
}

/// Shared key-value state.
///
/// Implemented by [`crate::MemoryStore`] for single-process use and tests
/// and by [`crate::PgStore`] for multi-process deployments.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Batched read. The result is positionally aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, StoreError>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>)
        -> Result<u64, StoreError>;

    /// Write only if the key is absent or expired. Returns whether it wrote.
    async fn put_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Write only if the key is live at `expected_revision`. Returns whether
    /// it wrote.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove the key only if its live value equals `expected`.
    async fn delete_if_value(&self, key: &str, expected: &Value) -> Result<bool, StoreError>;

    /// Apply a guarded multi-key write. Returns `false` if any guard failed,
    /// in which case nothing was written.
    async fn commit(&self, txn: Transaction) -> Result<bool, StoreError>;

    /// Up to `limit` live keys starting with `prefix` and strictly after
    /// `cursor`.
    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError>;

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Members in ascending order.
    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// Reclaim expired keys. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, StoreError> {
    T::deserialize(value).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })
}
