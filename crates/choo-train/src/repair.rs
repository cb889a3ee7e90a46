//! # Metadata Repair
//!
//! Re-attempts ticket metadata writes that failed after commitment. Each
//! pending entry is retried once per sweep: success removes it, failure
//! re-enqueues it with `first_failed_at` preserved and the attempt counter
//! bumped. Sweeps from different processes are serialized by a queue lock,
//! renewed for as long as the sweep runs; a sweep that loses the lock stops
//! and leaves the remaining entries for the next one.

use std::sync::Arc;
use std::time::Duration;

use choo_client::ContractService;
use choo_core::Timestamp;
use choo_state::MetadataRetryEntry;
use choo_store::{DistributedLock, KvStore, LockScope, MetadataRetryQueue};

use crate::config::TrainConfig;
use crate::error::{MovementError, Step};
use crate::lease::Lease;
use crate::orchestrator::bounded;
use crate::outcome::RepairReport;

/// Name of the lock scope guarding repair sweeps.
pub const REPAIR_QUEUE: &str = "metadata-repair";

pub struct MetadataRepairSweeper {
    queue: MetadataRetryQueue,
    lock: DistributedLock,
    contract: Arc<dyn ContractService>,
    lock_ttl: Duration,
    step_timeout: Duration,
}

impl MetadataRepairSweeper {
    pub fn new(store: Arc<dyn KvStore>, contract: Arc<dyn ContractService>, config: &TrainConfig) -> Self {
        Self {
            queue: MetadataRetryQueue::new(store.clone(), config.retry_retention),
            lock: DistributedLock::new(store),
            contract,
            lock_ttl: config.lock_ttl,
            step_timeout: config.step_timeout,
        }
    }

    /// Retry every pending metadata write once.
    pub async fn sweep(&self) -> Result<RepairReport, MovementError> {
        let scope = LockScope::Queue(REPAIR_QUEUE.to_string());
        let guard = bounded(Step::AcquireLock, self.step_timeout, self.lock.acquire(&scope, self.lock_ttl))
            .await
            .map_err(MovementError::Unavailable)?;
        let Some(guard) = guard else {
            return Err(MovementError::LockConflict { scope: scope.name() });
        };

        let lease = Lease::keep(self.lock.clone(), guard, self.lock_ttl);
        let result = self.sweep_locked(&lease).await;

        if let Err(e) = bounded(Step::ReleaseLock, self.step_timeout, self.lock.release(lease.into_guard())).await {
            tracing::error!(error = %e, "failed to release repair lock");
        }
        result
    }

    async fn sweep_locked(&self, lease: &Lease) -> Result<RepairReport, MovementError> {
        let entries = bounded(Step::ListRetries, self.step_timeout, self.queue.pending())
            .await
            .map_err(MovementError::Unavailable)?;
        let total = entries.len();
        let mut report = RepairReport::default();
        for entry in entries {
            if lease.is_lost() {
                tracing::warn!(remaining = entries_left(&report, total), "repair lock lost, stopping sweep");
                break;
            }
            let token_id = entry.token_id;
            if self.repair_one(&entry).await {
                report.repaired.push(token_id);
            } else {
                report.failed.push(token_id);
            }
        }
        tracing::info!(
            repaired = report.repaired.len(),
            failed = report.failed.len(),
            "metadata repair sweep finished"
        );
        Ok(report)
    }

    /// Returns whether the metadata is now written.
    async fn repair_one(&self, entry: &MetadataRetryEntry) -> bool {
        let token_id = entry.token_id;
        let write = bounded(
            Step::WriteMetadata,
            self.step_timeout,
            self.contract
                .set_ticket_metadata(token_id, &entry.token_uri, &entry.image_uri()),
        )
        .await;
        match write {
            Ok(()) => {
                if let Err(e) = bounded(Step::RemoveRetry, self.step_timeout, self.queue.remove(token_id)).await {
                    // The write landed; a second write of the same URIs is harmless.
                    tracing::warn!(token_id = %token_id, error = %e, "repaired but could not remove retry entry");
                }
                tracing::info!(token_id = %token_id, attempts = entry.attempts, "ticket metadata repaired");
                true
            }
            Err(failure) => {
                tracing::warn!(
                    token_id = %token_id,
                    attempts = entry.attempts,
                    error = %failure,
                    "metadata repair failed"
                );
                let mut again = entry.clone();
                again.last_error = Some(failure.reason);
                again.last_updated_at = Timestamp::now();
                if let Err(e) = bounded(Step::EnqueueRetry, self.step_timeout, self.queue.enqueue(again)).await {
                    tracing::error!(token_id = %token_id, error = %e, "failed to re-enqueue metadata retry");
                }
                false
            }
        }
    }
}

fn entries_left(report: &RepairReport, total: usize) -> usize {
    total.saturating_sub(report.repaired.len() + report.failed.len())
}
