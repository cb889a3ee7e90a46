//! # choo-store — Shared Train State
//!
//! Everything a movement persists, behind one [`KvStore`] abstraction so
//! multiple orchestrator processes can coordinate through the same backend.
//!
//! ## Components
//!
//! - **Backends** (`memory.rs`, `postgres.rs`): [`MemoryStore`] for
//!   single-process use and tests; [`PgStore`] over SQLx for deployments.
//!   [`open`] picks one from the database URL.
//!
//! - **Distributed Lock** (`lock.rs`): lease-based mutual exclusion with
//!   owner-checked release.
//!
//! - **Pending-Generation Cache** (`artifact_cache.rs`): generated artifacts
//!   per token id; first writer wins.
//!
//! - **Staging Store** (`staging.rs`): conditional create, compare-and-swap
//!   update, atomic promotion.
//!
//! - **Metadata Retry Queue** (`retry_queue.rs`): deferred metadata writes
//!   with a deduplicating index.
//!
//! - **Read model** (`read_model.rs`, `workflow.rs`): current holder,
//!   durable token records, the workflow flag.
//!
//! ## Crate Policy
//!
//! - No lock is held across an `.await`.
//! - Every multi-key write goes through [`KvStore::commit`].
//! - No `.unwrap()` outside tests.

pub mod artifact_cache;
pub mod error;
pub mod keys;
pub mod kv;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod read_model;
pub mod retry_queue;
pub mod staging;
pub mod workflow;

use std::sync::Arc;

pub use artifact_cache::{ArtifactCache, CacheError};
pub use error::{StagingError, StoreError};
pub use kv::{Guard, KvStore, ScanPage, Transaction, Versioned, WriteOp};
pub use lock::{DistributedLock, LockGuard, LockScope};
pub use memory::MemoryStore;
pub use postgres::{init_pool, PgStore};
pub use read_model::ReadModel;
pub use retry_queue::MetadataRetryQueue;
pub use staging::{PromoteOutcome, StagingStore, UpdateOutcome};
pub use workflow::WorkflowFlag;

/// Open the shared store: PostgreSQL when `database_url` is set, otherwise
/// an in-memory store private to this process.
pub async fn open(database_url: Option<&str>) -> Result<Arc<dyn KvStore>, StoreError> {
    match init_pool(database_url).await? {
        Some(pool) => Ok(Arc::new(PgStore::new(pool))),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
