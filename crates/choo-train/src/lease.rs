//! Background renewal of a held lock.
//!
//! A movement can legitimately run longer than the lock TTL (one artifact
//! generation alone may take `generation_timeout`). While a [`Lease`] is
//! alive it extends the lock every third of the TTL. If a renewal finds the
//! lease gone, the lease is marked lost and never renewed again; callers
//! check [`Lease::is_lost`] before any step that must not run unguarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use choo_store::{DistributedLock, LockGuard};

pub(crate) struct Lease {
    guard: LockGuard,
    lost: Arc<AtomicBool>,
    renewer: JoinHandle<()>,
}

impl Lease {
    /// Start renewing `guard` for `ttl` at a time.
    pub(crate) fn keep(lock: DistributedLock, guard: LockGuard, ttl: Duration) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let renewer = tokio::spawn(renew(lock, guard.clone(), ttl, lost.clone()));
        Self {
            guard,
            lost,
            renewer,
        }
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Stop renewing and hand back the guard for release.
    pub(crate) fn into_guard(self) -> LockGuard {
        self.renewer.abort();
        self.guard.clone()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.renewer.abort();
    }
}

async fn renew(lock: DistributedLock, guard: LockGuard, ttl: Duration, lost: Arc<AtomicBool>) {
    let every = ttl / 3;
    loop {
        tokio::time::sleep(every).await;
        match tokio::time::timeout(every, lock.extend(&guard, ttl)).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                tracing::error!(lock = %guard.key(), "lock lease lost before the work finished");
                lost.store(true, Ordering::Release);
                return;
            }
            // The lease is still good for two more periods; try again next tick.
            Ok(Err(e)) => tracing::warn!(lock = %guard.key(), error = %e, "lock renewal failed"),
            Err(_) => tracing::warn!(lock = %guard.key(), ?every, "lock renewal timed out"),
        }
    }
}
