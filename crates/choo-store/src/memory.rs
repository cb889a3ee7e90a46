//! # In-Memory Backend
//!
//! Thread-safe, cloneable [`KvStore`] held in process memory. Used when no
//! database is configured and throughout the test suites.
//!
//! Every operation takes the `parking_lot` lock once and never across an
//! `.await`, so each call (including [`KvStore::commit`]) is one critical
//! section. Expiry uses `tokio::time::Instant`, which lets tests drive TTLs
//! with a paused clock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::kv::{Guard, KvStore, ScanPage, Transaction, Versioned, WriteOp};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    revision: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl Inner {
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    fn write(&mut self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) -> u64 {
        let revision = self.live(key, now).map_or(1, |e| e.revision + 1);
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                revision,
                expires_at: ttl.map(|d| now + d),
            },
        );
        revision
    }

    fn remove(&mut self, key: &str, now: Instant) -> bool {
        match self.entries.remove(key) {
            Some(e) => e.is_live(now),
            None => false,
        }
    }

    fn guard_holds(&self, guard: &Guard, now: Instant) -> bool {
        match guard {
            Guard::Revision { key, revision } => {
                self.live(key, now).is_some_and(|e| e.revision == *revision)
            }
            Guard::Absent { key } => self.live(key, now).is_none(),
        }
    }
}

/// In-process [`KvStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn raw_len(&self) -> usize {
        self.inner.read().entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let now = Instant::now();
        Ok(self.inner.read().live(key, now).map(|e| Versioned {
            value: e.value.clone(),
            revision: e.revision,
        }))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, StoreError> {
        let now = Instant::now();
        let inner = self.inner.read();
        Ok(keys
            .iter()
            .map(|k| {
                inner.live(k, now).map(|e| Versioned {
                    value: e.value.clone(),
                    revision: e.revision,
                })
            })
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        Ok(self.inner.write().write(key, value, ttl, now))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.write(key, value, ttl, now);
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        match inner.live(key, now) {
            Some(e) if e.revision == expected_revision => {
                inner.write(key, value, ttl, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self.inner.write().remove(key, now))
    }

    async fn delete_if_value(&self, key: &str, expected: &Value) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        match inner.live(key, now) {
            Some(e) if &e.value == expected => Ok(inner.remove(key, now)),
            _ => Ok(false),
        }
    }

    async fn commit(&self, txn: Transaction) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        if !txn.guards.iter().all(|g| inner.guard_holds(g, now)) {
            return Ok(false);
        }
        for op in txn.ops {
            match op {
                WriteOp::Put { key, value, ttl } => {
                    inner.write(&key, value, ttl, now);
                }
                WriteOp::Delete { key } => {
                    inner.remove(&key, now);
                }
                WriteOp::SetAdd { set, member } => {
                    inner.sets.entry(set).or_default().insert(member);
                }
                WriteOp::SetRemove { set, member } => {
                    if let Some(members) = inner.sets.get_mut(&set) {
                        members.remove(&member);
                    }
                }
            }
        }
        Ok(true)
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let now = Instant::now();
        let inner = self.inner.read();
        let lower = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let keys: Vec<String> = inner
            .entries
            .range((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .take(limit)
            .collect();
        let next = if limit > 0 && keys.len() == limit {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ScanPage { keys, next })
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .write()
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .write()
            .sets
            .get_mut(set)
            .is_some_and(|m| m.remove(member)))
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .sets
            .get(set)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.is_live(now));
        Ok((before - inner.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn revisions_start_at_one_and_increase() {
        let store = MemoryStore::new();
        assert_eq!(store.put("k", json!(1), None).await.unwrap(), 1);
        assert_eq!(store.put("k", json!(2), None).await.unwrap(), 2);
        let v = store.get("k").await.unwrap().unwrap();
        assert_eq!(v.revision, 2);
        assert_eq!(v.value, json!(2));
    }

    #[tokio::test]
    async fn put_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("k", json!("a"), None).await.unwrap());
        assert!(!store.put_if_absent("k", json!("b"), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap().value, json!("a"));
    }

    #[tokio::test]
    async fn cas_rejects_stale_revision() {
        let store = MemoryStore::new();
        store.put("k", json!(0), None).await.unwrap();
        assert!(store.compare_and_swap("k", 1, json!(1), None).await.unwrap());
        assert!(!store.compare_and_swap("k", 1, json!(2), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn cas_on_missing_key_fails() {
        let store = MemoryStore::new();
        assert!(!store.compare_and_swap("k", 1, json!(1), None).await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_invisible_and_reusable() {
        let store = MemoryStore::new();
        store
            .put("k", json!("old"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.put_if_absent("k", json!("new"), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = MemoryStore::new();
        store
            .put("a", json!(1), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.put("b", json!(2), None).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.raw_len(), 1);
    }

    #[tokio::test]
    async fn delete_if_value_checks_owner() {
        let store = MemoryStore::new();
        store.put("lock", json!("me"), None).await.unwrap();
        assert!(!store.delete_if_value("lock", &json!("you")).await.unwrap());
        assert!(store.delete_if_value("lock", &json!("me")).await.unwrap());
        assert!(store.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_guard_writes_nothing() {
        let store = MemoryStore::new();
        store.put("a", json!(1), None).await.unwrap();
        store.put("b", json!(1), None).await.unwrap();
        let txn = Transaction::new()
            .require_revision("a", 1)
            .require_absent("b")
            .put("c", json!(1), None)
            .delete("a");
        assert!(!store.commit(txn).await.unwrap());
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_applies_all_ops() {
        let store = MemoryStore::new();
        store.put("a", json!(1), None).await.unwrap();
        let txn = Transaction::new()
            .require_revision("a", 1)
            .require_absent("b")
            .put("b", json!(2), None)
            .delete("a")
            .set_add("s", "b");
        assert!(store.commit(txn).await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.get("b").await.unwrap().unwrap().value, json!(2));
        assert_eq!(store.set_members("s").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn scan_pages_through_prefix() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.put(&format!("staging:{i}"), json!(i), None).await.unwrap();
        }
        store.put("token:1", json!(1), None).await.unwrap();
        store.put("stage", json!(1), None).await.unwrap();

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store
                .scan_prefix("staging:", cursor.as_deref(), 2)
                .await
                .unwrap();
            seen.extend(page.keys);
            match page.next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|k| k.starts_with("staging:")));
    }

    #[tokio::test]
    async fn get_many_is_positional() {
        let store = MemoryStore::new();
        store.put("a", json!(1), None).await.unwrap();
        let got = store
            .get_many(&["missing".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert!(got[0].is_none());
        assert_eq!(got[1].as_ref().unwrap().value, json!(1));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn block_on<F: std::future::Future>(fut: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap()
                .block_on(fut)
        }

        proptest! {
            /// A swap lands only at the live revision, and each landed swap
            /// moves the revision forward by exactly one.
            #[test]
            fn cas_only_lands_on_the_current_revision(guesses in proptest::collection::vec(0u64..8, 1..40)) {
                block_on(async {
                    let store = MemoryStore::new();
                    let mut revision = store.put("k", json!(0), None).await.unwrap();
                    for (n, guess) in guesses.into_iter().enumerate() {
                        let swapped = store
                            .compare_and_swap("k", guess, json!(n), None)
                            .await
                            .unwrap();
                        prop_assert_eq!(swapped, guess == revision);
                        if swapped {
                            revision += 1;
                        }
                        let stored = store.get("k").await.unwrap().unwrap();
                        prop_assert_eq!(stored.revision, revision);
                    }
                    Ok(())
                })?;
            }

            /// Conditional create writes at most once per key.
            #[test]
            fn put_if_absent_writes_once(values in proptest::collection::vec(any::<i64>(), 1..20)) {
                block_on(async {
                    let store = MemoryStore::new();
                    let mut created = 0;
                    for v in &values {
                        if store.put_if_absent("k", json!(v), None).await.unwrap() {
                            created += 1;
                        }
                    }
                    prop_assert_eq!(created, 1);
                    let stored = store.get("k").await.unwrap().unwrap();
                    prop_assert_eq!(stored.value, json!(values[0]));
                    prop_assert_eq!(stored.revision, 1);
                    Ok(())
                })?;
            }
        }
    }
}
