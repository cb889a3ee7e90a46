//! # Distributed Lock
//!
//! Mutual exclusion across processes, built on one atomic set-if-absent.
//! The stored value is a random owner token; release deletes the key only
//! if that token still matches, so a holder whose lease expired can never
//! release a lock someone else has since acquired.
//!
//! A holder whose work may outlast the TTL renews the lease with
//! [`DistributedLock::extend`]. The lock bounds concurrency but is not the
//! correctness mechanism for staging progress: a holder that loses its
//! lease may overlap with the next one, and the staging compare-and-swap
//! decides between them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use choo_core::Address;

use crate::error::StoreError;
use crate::keys;
use crate::kv::KvStore;

/// What a movement lock protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// The train itself; serializes every movement.
    Train,
    /// One sender/recipient pair; used for per-pair sends.
    Pair { from: Address, to: Address },
    /// A named work queue, e.g. the metadata repair sweep.
    Queue(String),
}

impl LockScope {
    /// The scope's segment of the `lock:{scope}` key.
    pub fn name(&self) -> String {
        match self {
            Self::Train => "train".to_string(),
            Self::Pair { from, to } => format!("pair:{from}:{to}"),
            Self::Queue(name) => format!("queue:{name}"),
        }
    }

    pub fn key(&self) -> String {
        keys::lock(&self.name())
    }
}

impl std::fmt::Display for LockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Proof of a held lock. Pass it back to [`DistributedLock::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    key: String,
    owner: Uuid,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }
}

/// Lease-based lock over a shared [`KvStore`].
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KvStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Try once to take the lock for `ttl`. `None` means someone else holds it.
    pub async fn acquire(
        &self,
        scope: &LockScope,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, StoreError> {
        let key = scope.key();
        let owner = Uuid::new_v4();
        let acquired = self
            .store
            .put_if_absent(&key, Value::String(owner.to_string()), Some(ttl))
            .await?;
        if acquired {
            tracing::debug!(lock = %key, %owner, "lock acquired");
            Ok(Some(LockGuard { key, owner }))
        } else {
            tracing::debug!(lock = %key, "lock held elsewhere");
            Ok(None)
        }
    }

    /// Push the lease of a held lock out to `ttl` from now. Returns `false`
    /// if the lease already lapsed or belongs to someone else.
    pub async fn extend(&self, guard: &LockGuard, ttl: Duration) -> Result<bool, StoreError> {
        let owner = Value::String(guard.owner.to_string());
        let Some(current) = self.store.get(&guard.key).await? else {
            return Ok(false);
        };
        if current.value != owner {
            return Ok(false);
        }
        let extended = self
            .store
            .compare_and_swap(&guard.key, current.revision, owner, Some(ttl))
            .await?;
        if extended {
            tracing::trace!(lock = %guard.key, ?ttl, "lock lease extended");
        }
        Ok(extended)
    }

    /// Release a held lock. Returns `false` if the lease had already expired
    /// (and possibly been taken by another owner).
    pub async fn release(&self, guard: LockGuard) -> Result<bool, StoreError> {
        let released = self
            .store
            .delete_if_value(&guard.key, &Value::String(guard.owner.to_string()))
            .await?;
        if !released {
            tracing::warn!(
                lock = %guard.key,
                owner = %guard.owner,
                "lock lease expired before release"
            );
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryStore::new()))
    }

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn second_acquire_conflicts() {
        let lock = lock();
        let first = lock.acquire(&LockScope::Train, TTL).await.unwrap();
        assert!(first.is_some());
        assert!(lock.acquire(&LockScope::Train, TTL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_frees_the_lock() {
        let lock = lock();
        let guard = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        assert!(lock.release(guard).await.unwrap());
        assert!(lock.acquire(&LockScope::Train, TTL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let lock = lock();
        let _train = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        let queue = LockScope::Queue("metadata-repair".into());
        assert!(lock.acquire(&queue, TTL).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_reacquirable_and_stale_release_is_refused() {
        let lock = lock();
        let stale = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        tokio::time::advance(TTL + Duration::from_millis(1)).await;

        let fresh = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        assert_ne!(stale.owner(), fresh.owner());

        // The stale holder must not release the new owner's lock.
        assert!(!lock.release(stale).await.unwrap());
        assert!(lock.acquire(&LockScope::Train, TTL).await.unwrap().is_none());
        assert!(lock.release(fresh).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn extend_keeps_the_lease_alive() {
        let lock = lock();
        let guard = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(lock.extend(&guard, TTL).await.unwrap());
        tokio::time::advance(Duration::from_secs(20)).await;

        // 40 s after acquiring, still held thanks to the renewal.
        assert!(lock.acquire(&LockScope::Train, TTL).await.unwrap().is_none());
        assert!(lock.release(guard).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn extend_refuses_a_lapsed_or_foreign_lease() {
        let lock = lock();
        let stale = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert!(!lock.extend(&stale, TTL).await.unwrap());

        let fresh = lock.acquire(&LockScope::Train, TTL).await.unwrap().unwrap();
        assert!(!lock.extend(&stale, TTL).await.unwrap());
        assert!(lock.extend(&fresh, TTL).await.unwrap());
    }

    #[test]
    fn pair_scope_key() {
        let from = Address::new(format!("0x{}", "1".repeat(40))).unwrap();
        let to = Address::new(format!("0x{}", "2".repeat(40))).unwrap();
        let scope = LockScope::Pair { from, to };
        assert!(scope.key().starts_with("lock:pair:0x111"));
    }
}
