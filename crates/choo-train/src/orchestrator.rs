//! # Train Movement Orchestrator
//!
//! Drives one movement of the train end to end. Each step is safe to
//! re-enter after a crash, because every piece of progress is recorded in
//! the staging record before the next step starts:
//!
//! 1. **Lock** the requested scope. Held elsewhere: [`MovementError::LockConflict`].
//!    The lease is renewed in the background until the lock is released.
//!
//! 2. **Inspect staging** for the contract's predicted next ticket id. A
//!    live record is [`MovementError::InProgress`]; a `completed` record is
//!    promoted without generating or transferring again; a stuck record is
//!    abandoned and its cached artifact dropped; a `failed` record is
//!    discarded while its cached artifact is kept for reuse.
//!
//! 3. **Stage** a `preparing` record with participant snapshots.
//!
//! 4. **Generate** the ticket artifact through the pending-generation cache
//!    (`pinata_uploaded`).
//!
//! 5. **Commit** the on-chain transfer (`minted`), unless the lock lease was
//!    lost. From here on the movement has happened and the call reports
//!    success.
//!
//! 6. **Write metadata**, best effort (`metadata_set`, or flagged for repair).
//!
//! 7. **Complete and promote**, enqueue a metadata retry if needed, clear
//!    the cache, reset the workflow flag, announce in the background.
//!
//! 8. **Release** the lock, whatever happened above.
//!
//! ## Failure Handling
//!
//! Any failure before step 5 marks the staging record `failed`, resets the
//! workflow flag and returns [`MovementError::PreCommit`]. After step 5 the
//! receipt is kept in memory and each staging write is re-attempted a few
//! times, re-reading the record in between. Shortfalls are logged and
//! reported through [`MovementOutcome`]; a record that could not be walked
//! to `completed` is finished later by [`TrainOrchestrator::recover_stale`].
//!
//! Promotion precondition violations on a record found on entry are never
//! swallowed ([`MovementError::Fatal`]). After commitment they are logged
//! and reported as `promoted: false`.
//!
//! Every external call is bounded by `step_timeout`; artifact generation by
//! `generation_timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use choo_client::{Announcer, ArtifactGenerator, ChooClient, ContractService, IdentityResolver};
use choo_core::{ParticipantSnapshot, Timestamp, TokenId};
use choo_state::{
    ArtifactRefs, Commitment, MetadataRetryEntry, MovementStatus, PromotionPreconditionError,
    StagingMovement, StagingPatch, TokenIdSource, WorkflowState,
};
use choo_store::{
    ArtifactCache, DistributedLock, KvStore, LockGuard, MetadataRetryQueue,
    PromoteOutcome, ReadModel, StagingError, StagingStore, UpdateOutcome, WorkflowFlag,
};

use crate::config::TrainConfig;
use crate::error::{MovementError, Step, StepFailure};
use crate::lease::Lease;
use crate::notify;
use crate::outcome::{MovementOutcome, RecoveryReport};
use crate::repair::MetadataRepairSweeper;
use crate::request::MovementRequest;

/// The outside services a movement calls.
#[derive(Clone)]
pub struct Collaborators {
    pub contract: Arc<dyn ContractService>,
    pub generator: Arc<dyn ArtifactGenerator>,
    pub identity: Arc<dyn IdentityResolver>,
    pub announcer: Arc<dyn Announcer>,
}

impl Collaborators {
    /// The HTTP adapters of `client`.
    pub fn from_client(client: &ChooClient) -> Self {
        Self {
            contract: Arc::new(client.contract().clone()),
            generator: Arc::new(client.generator().clone()),
            identity: Arc::new(client.identity().clone()),
            announcer: Arc::new(client.announcer().clone()),
        }
    }
}

/// Rounds a staging write is attempted after commitment.
const POST_COMMIT_ATTEMPTS: u32 = 3;

/// Pause before the second post-commit round; doubled for each further one.
const POST_COMMIT_BACKOFF: Duration = Duration::from_millis(100);

/// Written as `last_error` when a committed record is completed without
/// knowing whether its metadata write landed.
const METADATA_UNCONFIRMED: &str = "metadata write unconfirmed before recovery";

/// Run `fut` under `limit`, flattening timeout and error into a [`StepFailure`].
pub(crate) async fn bounded<T, E, F>(step: Step, limit: Duration, fut: F) -> Result<T, StepFailure>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StepFailure::new(step, e.to_string())),
        Err(_) => Err(StepFailure::timed_out(step, limit)),
    }
}

/// How a staging update that did not apply is described in logs and errors.
fn not_applied(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::Applied(_) => "applied".to_string(),
        UpdateOutcome::Exhausted => "lost every compare-and-swap attempt".to_string(),
        UpdateOutcome::Missing => "staging record disappeared".to_string(),
        UpdateOutcome::Rejected(e) => e.to_string(),
    }
}

/// What finishing a completed record achieved.
struct Settlement {
    promoted: bool,
}

pub struct TrainOrchestrator {
    config: TrainConfig,
    lock: DistributedLock,
    cache: ArtifactCache,
    staging: StagingStore,
    retries: MetadataRetryQueue,
    read_model: ReadModel,
    workflow: WorkflowFlag,
    services: Collaborators,
    store: Arc<dyn KvStore>,
}

impl TrainOrchestrator {
    pub fn new(store: Arc<dyn KvStore>, services: Collaborators, config: TrainConfig) -> Self {
        Self {
            lock: DistributedLock::new(store.clone()),
            cache: ArtifactCache::new(store.clone(), config.artifact_ttl),
            staging: StagingStore::new(store.clone(), config.staging_ttl),
            retries: MetadataRetryQueue::new(store.clone(), config.retry_retention),
            read_model: ReadModel::new(store.clone()),
            workflow: WorkflowFlag::new(store.clone()),
            services,
            config,
            store,
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn retry_queue(&self) -> &MetadataRetryQueue {
        &self.retries
    }

    pub fn read_model(&self) -> &ReadModel {
        &self.read_model
    }

    pub fn artifact_cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// A repair sweeper sharing this orchestrator's store and contract.
    pub fn repair_sweeper(&self) -> MetadataRepairSweeper {
        MetadataRepairSweeper::new(
            self.store.clone(),
            self.services.contract.clone(),
            &self.config,
        )
    }

    /// Move the train to `request.to`.
    pub async fn move_train(
        &self,
        request: &MovementRequest,
    ) -> Result<MovementOutcome, MovementError> {
        let limit = self.config.step_timeout;
        let guard = bounded(
            Step::AcquireLock,
            limit,
            self.lock.acquire(&request.scope, self.config.lock_ttl),
        )
        .await
        .map_err(MovementError::Unavailable)?;
        let Some(guard) = guard else {
            tracing::info!(scope = %request.scope, "movement lock held elsewhere");
            return Err(MovementError::LockConflict {
                scope: request.scope.name(),
            });
        };

        let lease = Lease::keep(self.lock.clone(), guard, self.config.lock_ttl);

        tracing::info!(
            to = %request.to,
            kind = %request.kind,
            scope = %request.scope,
            "movement started"
        );
        let result = self.run(request, &lease).await;
        match &result {
            Ok(outcome) => tracing::info!(
                token_id = %outcome.token_id,
                tx_hash = %outcome.tx_hash,
                metadata_deferred = outcome.metadata_deferred,
                promoted = outcome.promoted,
                recovered = outcome.recovered,
                "movement finished"
            ),
            Err(e) => tracing::warn!(error = %e, "movement did not complete"),
        }
        self.release(lease.into_guard()).await;
        result
    }

    async fn release(&self, guard: LockGuard) {
        let key = guard.key().to_string();
        if let Err(e) = bounded(Step::ReleaseLock, self.config.step_timeout, self.lock.release(guard)).await {
            tracing::error!(lock = %key, error = %e, "failed to release movement lock");
        }
    }

    async fn run(
        &self,
        request: &MovementRequest,
        lease: &Lease,
    ) -> Result<MovementOutcome, MovementError> {
        let limit = self.config.step_timeout;
        let contract = &self.services.contract;

        let predicted = match bounded(Step::PredictTokenId, limit, contract.next_ticket_id()).await {
            Ok(id) => id,
            Err(failure) => return Err(self.abort(None, failure).await),
        };

        let existing = match bounded(Step::ReadStaging, limit, self.staging.get(predicted)).await {
            Ok(existing) => existing,
            Err(failure) => return Err(self.abort(None, failure).await),
        };
        if let Some(existing) = existing {
            if let Some(recovered) = self.resolve_existing(existing).await? {
                return Ok(recovered);
            }
        }

        let new_holder = match bounded(
            Step::ResolveNewHolder,
            limit,
            self.services.identity.resolve_user(request.to),
        )
        .await
        {
            Ok(user) => user.snapshot(),
            Err(failure) => return Err(self.abort(None, failure).await),
        };
        let departing = match self.departing_passenger().await {
            Ok(snapshot) => snapshot,
            Err(failure) => return Err(self.abort(None, failure).await),
        };

        let staged = StagingMovement::new(
            predicted,
            request.kind,
            new_holder,
            departing,
            Timestamp::now(),
        );
        match bounded(Step::CreateStaging, limit, self.staging.create(&staged)).await {
            Ok(true) => {}
            Ok(false) => {
                // Another orchestrator staged this id between our read and create.
                let status = self
                    .staging
                    .get(predicted)
                    .await
                    .ok()
                    .flatten()
                    .map(|r| r.status)
                    .unwrap_or(MovementStatus::Preparing);
                return Err(MovementError::InProgress {
                    token_id: predicted,
                    status,
                });
            }
            Err(failure) => return Err(self.abort(None, failure).await),
        }

        // Everything up to the transfer may fail and be retried from scratch.
        let artifact = match self.generate(&staged).await {
            Ok(artifact) => artifact,
            Err(failure) => return Err(self.abort(Some(predicted), failure).await),
        };
        if let Err(failure) = self
            .advance(predicted, StagingPatch::uploaded(artifact.clone()))
            .await
        {
            return Err(self.abort(Some(predicted), failure).await);
        }

        if lease.is_lost() {
            let failure = StepFailure::new(Step::RenewLock, "movement lock lease lost before transfer");
            return Err(self.abort(Some(predicted), failure).await);
        }
        let receipt = match bounded(
            Step::Transfer,
            limit,
            contract.execute_transfer(&staged.new_holder.address, &artifact.token_uri),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(failure) => return Err(self.abort(Some(predicted), failure).await),
        };

        // Committed on-chain. No failure below turns into an error result.
        let (minted_id, token_id_source) = match bounded(
            Step::ReadMintedTokenId,
            limit,
            contract.minted_token_id(&receipt.tx_hash),
        )
        .await
        {
            Ok(id) => (id, TokenIdSource::Receipt),
            Err(e) => {
                tracing::warn!(
                    token_id = %predicted,
                    tx_hash = %receipt.tx_hash,
                    error = %e,
                    "minted token id unavailable, recording predicted id"
                );
                (predicted, TokenIdSource::Predicted)
            }
        };
        if minted_id != predicted {
            tracing::warn!(
                predicted = %predicted,
                minted = %minted_id,
                "minted token id differs from prediction"
            );
        }
        let commitment = Commitment {
            tx_hash: receipt.tx_hash.clone(),
            block_number: receipt.block_number,
            minted_token_id: minted_id,
            token_id_source,
        };
        let minted = self
            .reach(predicted, MovementStatus::Minted, StagingPatch::minted(commitment))
            .await;

        self.verify_counter_advanced(minted_id).await;

        let metadata_error = match bounded(
            Step::WriteMetadata,
            limit,
            contract.set_ticket_metadata(minted_id, &artifact.token_uri, &artifact.image_uri()),
        )
        .await
        {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(token_id = %minted_id, error = %e, "metadata write failed, deferring");
                Some(e.to_string())
            }
        };

        let completed = match minted {
            Some(_) => self.complete(predicted, metadata_error.as_deref()).await,
            None => None,
        };
        if completed.is_none() {
            tracing::error!(
                token_id = %minted_id,
                staged_token_id = %predicted,
                tx_hash = %receipt.tx_hash,
                block_number = receipt.block_number,
                "committed movement not completed in staging, left for recovery"
            );
        }

        let retry = metadata_error.clone().map(|error| {
            MetadataRetryEntry::new(
                minted_id,
                artifact.token_uri.clone(),
                artifact.image_hash.clone(),
                request.kind,
                Some(error),
                Timestamp::now(),
            )
        });
        let settlement = match self.settle(completed.as_ref(), retry).await {
            Ok(settlement) => settlement,
            Err(e) => {
                tracing::error!(
                    token_id = %minted_id,
                    error = %e,
                    "promotion refused after commitment, left for recovery"
                );
                Settlement { promoted: false }
            }
        };
        self.reset_workflow().await;

        Ok(MovementOutcome {
            token_id: minted_id,
            staged_token_id: predicted,
            token_id_source,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            operation_kind: request.kind,
            new_holder: staged.new_holder,
            departing_passenger: staged.departing_passenger,
            metadata_deferred: metadata_error.is_some(),
            promoted: settlement.promoted,
            recovered: false,
        })
    }

    /// Decide what to do with a staging record found for the target id.
    ///
    /// `Ok(Some(_))` finished an earlier attempt; `Ok(None)` cleared the way
    /// for a fresh one.
    async fn resolve_existing(
        &self,
        existing: StagingMovement,
    ) -> Result<Option<MovementOutcome>, MovementError> {
        let limit = self.config.step_timeout;
        let token_id = existing.token_id;
        match existing.status {
            MovementStatus::Completed => {
                tracing::info!(token_id = %token_id, "found completed staging record, promoting");
                let outcome = self.recover_completed(existing).await?;
                self.reset_workflow().await;
                Ok(Some(outcome))
            }
            MovementStatus::Failed => {
                // The cached artifact stays so this attempt reuses it.
                match bounded(
                    Step::DiscardStaging,
                    limit,
                    self.staging.discard(token_id, existing.version),
                )
                .await
                {
                    Ok(true) => Ok(None),
                    Ok(false) => Err(MovementError::InProgress {
                        token_id,
                        status: existing.status,
                    }),
                    Err(failure) => Err(self.abort(None, failure).await),
                }
            }
            status if self.staging.is_stuck(&existing, self.config.stuck_threshold) => {
                tracing::warn!(
                    token_id = %token_id,
                    status = %status,
                    created_at = %existing.created_at,
                    "reclaiming stuck staging record"
                );
                if let Err(failure) = self.reclaim_stuck(token_id, status).await {
                    return Err(self.abort(None, failure).await);
                }
                Ok(None)
            }
            status => Err(MovementError::InProgress { token_id, status }),
        }
    }

    /// Abandon a stuck record, drop its cached artifact and remove it so a
    /// fresh attempt can stage the same id.
    async fn reclaim_stuck(&self, token_id: TokenId, status: MovementStatus) -> Result<(), StepFailure> {
        let abandoned = self.abandon_stuck(token_id, status).await?;
        let removed = bounded(
            Step::DiscardStaging,
            self.config.step_timeout,
            self.staging.discard(token_id, abandoned.version),
        )
        .await?;
        if !removed {
            return Err(StepFailure::new(
                Step::DiscardStaging,
                "abandoned record changed before removal",
            ));
        }
        Ok(())
    }

    /// The current holder, who receives the ticket for this movement.
    async fn departing_passenger(&self) -> Result<ParticipantSnapshot, StepFailure> {
        let limit = self.config.step_timeout;
        let pointer = bounded(
            Step::ResolveDepartingPassenger,
            limit,
            self.read_model.current_holder(),
        )
        .await?;
        if let Some(current) = pointer {
            return Ok(current.holder);
        }
        let address = bounded(
            Step::ResolveDepartingPassenger,
            limit,
            self.services.contract.current_holder(),
        )
        .await?;
        tracing::info!(address = %address, "no holder pointer yet, using on-chain holder");
        Ok(ParticipantSnapshot::from_address(address))
    }

    async fn generate(&self, staged: &StagingMovement) -> Result<ArtifactRefs, StepFailure> {
        let token_id = staged.token_id;
        let label = staged.departing_passenger.label();
        let generator = self.services.generator.clone();
        let work = self.cache.get_or_create(token_id, move || async move {
            generator
                .generate(token_id, &label)
                .await
                .map(ArtifactRefs::from)
        });
        match tokio::time::timeout(self.config.generation_timeout, work).await {
            Ok(Ok(artifact)) => Ok(artifact),
            Ok(Err(e)) => Err(StepFailure::new(Step::GenerateArtifact, e.to_string())),
            Err(_) => Err(StepFailure::timed_out(
                Step::GenerateArtifact,
                self.config.generation_timeout,
            )),
        }
    }

    /// Apply `patch`, treating anything but an applied update as a failure.
    async fn advance(&self, token_id: TokenId, patch: StagingPatch) -> Result<StagingMovement, StepFailure> {
        let outcome = bounded(
            Step::UpdateStaging,
            self.config.step_timeout,
            self.staging.update(token_id, &patch, self.config.cas_max_retries),
        )
        .await?;
        match outcome {
            UpdateOutcome::Applied(record) => Ok(record),
            other => Err(StepFailure::new(Step::UpdateStaging, not_applied(&other))),
        }
    }

    /// Apply `patch` after commitment until the record has reached `target`,
    /// re-reading between rounds. `None` once every round failed.
    async fn reach(
        &self,
        token_id: TokenId,
        target: MovementStatus,
        patch: StagingPatch,
    ) -> Option<StagingMovement> {
        for attempt in 1..=POST_COMMIT_ATTEMPTS {
            let failure = match self.advance(token_id, patch.clone()).await {
                Ok(record) => return Some(record),
                Err(failure) => failure,
            };
            // The write may have landed without us seeing the reply, or a
            // recovery sweep may have moved the record on.
            if let Ok(Some(current)) =
                bounded(Step::ReadStaging, self.config.step_timeout, self.staging.get(token_id)).await
            {
                if current.status.has_reached(target) {
                    return Some(current);
                }
            }
            tracing::warn!(
                token_id = %token_id,
                target = %target,
                attempt,
                error = %failure,
                "post-commit staging update failed"
            );
            if attempt < POST_COMMIT_ATTEMPTS {
                tokio::time::sleep(POST_COMMIT_BACKOFF * 2u32.pow(attempt - 1)).await;
            }
        }
        tracing::error!(
            token_id = %token_id,
            target = %target,
            attempts = POST_COMMIT_ATTEMPTS,
            "post-commit staging update gave up"
        );
        None
    }

    /// Walk a minted record to `completed`, through `metadata_set` when the
    /// metadata write landed.
    async fn complete(&self, token_id: TokenId, metadata_error: Option<&str>) -> Option<StagingMovement> {
        let finish = match metadata_error {
            None => {
                // minted -> completed is legal too, so completion goes ahead
                // even if this write never lands.
                let _ = self
                    .reach(token_id, MovementStatus::MetadataSet, StagingPatch::status(MovementStatus::MetadataSet))
                    .await;
                StagingPatch::status(MovementStatus::Completed)
            }
            Some(error) => StagingPatch {
                status: Some(MovementStatus::Completed),
                ..StagingPatch::metadata_deferred(error)
            },
        };
        self.reach(token_id, MovementStatus::Completed, finish).await
    }

    /// The contract's counter should have moved past the ticket just minted.
    async fn verify_counter_advanced(&self, minted: TokenId) {
        match bounded(
            Step::VerifyNextTokenId,
            self.config.step_timeout,
            self.services.contract.next_ticket_id(),
        )
        .await
        {
            Ok(next) if next <= minted => tracing::warn!(
                minted = %minted,
                next = %next,
                "ticket counter has not advanced past minted token"
            ),
            Ok(_) => {}
            Err(e) => tracing::debug!(minted = %minted, error = %e, "could not verify ticket counter"),
        }
    }

    /// Pre-commit failure: mark the staging record failed (when one was
    /// created) and reset the workflow flag.
    async fn abort(&self, staged: Option<TokenId>, failure: StepFailure) -> MovementError {
        tracing::error!(step = %failure.step, error = %failure.reason, "movement failed before commitment");
        if let Some(token_id) = staged {
            match bounded(
                Step::UpdateStaging,
                self.config.step_timeout,
                self.staging
                    .abandon(token_id, &failure.to_string(), self.config.cas_max_retries),
            )
            .await
            {
                Ok(UpdateOutcome::Applied(_)) => {}
                Ok(other) => tracing::warn!(
                    token_id = %token_id,
                    reason = %not_applied(&other),
                    "could not mark staging record failed"
                ),
                Err(e) => tracing::warn!(
                    token_id = %token_id,
                    error = %e,
                    "could not mark staging record failed"
                ),
            }
        }
        self.reset_workflow().await;
        MovementError::PreCommit(failure)
    }

    async fn reset_workflow(&self) {
        if let Err(e) = bounded(
            Step::ResetWorkflow,
            self.config.step_timeout,
            self.workflow.set(WorkflowState::NotCasted),
        )
        .await
        {
            tracing::warn!(error = %e, "failed to reset workflow state");
        }
    }

    /// Finish a completed record found on entry.
    async fn recover_completed(&self, record: StagingMovement) -> Result<MovementOutcome, MovementError> {
        let commitment = record.trusted_commitment().cloned().ok_or_else(|| {
            MovementError::Fatal(StagingError::PromotionPrecondition(
                PromotionPreconditionError::MissingCommitment(record.token_id),
            ))
        })?;
        let retry = Self::retry_entry_for(&record);
        let metadata_deferred = retry.is_some();
        let settlement = self
            .settle(Some(&record), retry)
            .await
            .map_err(MovementError::Fatal)?;
        Ok(MovementOutcome {
            token_id: commitment.minted_token_id,
            staged_token_id: record.token_id,
            token_id_source: commitment.token_id_source,
            tx_hash: commitment.tx_hash,
            block_number: commitment.block_number,
            operation_kind: record.operation_kind,
            new_holder: record.new_holder,
            departing_passenger: record.departing_passenger,
            metadata_deferred,
            promoted: settlement.promoted,
            recovered: true,
        })
    }

    /// The retry entry a completed record still owes, if its metadata
    /// write was deferred.
    fn retry_entry_for(record: &StagingMovement) -> Option<MetadataRetryEntry> {
        if !record.needs_metadata_retry {
            return None;
        }
        let artifact = record.trusted_artifact()?;
        let commitment = record.trusted_commitment()?;
        Some(MetadataRetryEntry::new(
            commitment.minted_token_id,
            artifact.token_uri.clone(),
            artifact.image_hash.clone(),
            record.operation_kind,
            record.last_error.clone(),
            Timestamp::now(),
        ))
    }

    /// Promote `record` (when there is one), then enqueue `retry` and clear
    /// the cached artifact of a promoted movement.
    ///
    /// The retry entry is written even when promotion fails, fatally or not.
    async fn settle(
        &self,
        record: Option<&StagingMovement>,
        retry: Option<MetadataRetryEntry>,
    ) -> Result<Settlement, StagingError> {
        let limit = self.config.step_timeout;
        let promoted = match record {
            Some(record) => self.promote(record).await,
            None => Ok(false),
        };

        if let Some(entry) = retry {
            let retry_id = entry.token_id;
            if let Err(e) = bounded(Step::EnqueueRetry, limit, self.retries.enqueue(entry)).await {
                tracing::error!(token_id = %retry_id, error = %e, "failed to enqueue metadata retry");
            }
        }
        if let (Ok(true), Some(record)) = (&promoted, record) {
            let token_id = record.token_id;
            if let Err(e) = bounded(Step::ClearArtifact, limit, self.cache.clear(token_id)).await {
                tracing::warn!(token_id = %token_id, error = %e, "failed to clear pending artifact");
            }
        }
        promoted.map(|promoted| Settlement { promoted })
    }

    /// Promote a completed record and announce it. `Ok(false)` leaves it for
    /// recovery; only precondition violations are errors.
    async fn promote(&self, record: &StagingMovement) -> Result<bool, StagingError> {
        let limit = self.config.step_timeout;
        let token_id = record.token_id;
        match tokio::time::timeout(limit, self.staging.promote(token_id)).await {
            Ok(Ok(PromoteOutcome::Promoted(durable))) => {
                notify::dispatch(
                    self.services.announcer.clone(),
                    notify::announcement_for(&durable),
                    limit,
                );
                Ok(true)
            }
            Ok(Ok(PromoteOutcome::AlreadyPromoted(_))) => Ok(true),
            Ok(Err(StagingError::NotFound(_))) => Ok(self.promoted_elsewhere(record).await),
            Ok(Err(e)) if e.is_fatal() => {
                tracing::error!(token_id = %token_id, error = %e, "promotion precondition violated");
                Err(e)
            }
            Ok(Err(e)) => {
                tracing::error!(token_id = %token_id, error = %e, "promotion failed, left for recovery");
                Ok(false)
            }
            Err(_) => {
                tracing::error!(token_id = %token_id, ?limit, "promotion timed out, left for recovery");
                Ok(false)
            }
        }
    }

    /// The staging record vanished under us: someone else promoted it if the
    /// durable record exists under the minted id.
    async fn promoted_elsewhere(&self, record: &StagingMovement) -> bool {
        let minted = record
            .trusted_commitment()
            .map(|c| c.minted_token_id)
            .unwrap_or(record.token_id);
        match bounded(Step::Promote, self.config.step_timeout, self.read_model.token(minted)).await {
            Ok(Some(_)) => {
                tracing::info!(token_id = %minted, "movement already promoted by another finisher");
                true
            }
            Ok(None) => {
                tracing::error!(
                    token_id = %record.token_id,
                    minted = %minted,
                    "staging record gone without a durable record"
                );
                false
            }
            Err(e) => {
                tracing::warn!(token_id = %minted, error = %e, "could not confirm promotion");
                false
            }
        }
    }

    /// Sweep staging without taking the movement lock: promote completed
    /// records, finish stuck records whose transfer is already on-chain,
    /// abandon other stuck ones and leave failed ones alone.
    pub async fn recover_stale(&self) -> Result<RecoveryReport, MovementError> {
        let records = bounded(Step::ListStaging, self.config.step_timeout, self.staging.list())
            .await
            .map_err(MovementError::Unavailable)?;
        let mut report = RecoveryReport::default();
        for record in records {
            let token_id = record.token_id;
            match record.status {
                MovementStatus::Completed => self.settle_recovered(&record, &mut report).await,
                MovementStatus::Failed => report.failed_left.push(token_id),
                status if self.staging.is_stuck(&record, self.config.stuck_threshold) => {
                    if record.trusted_commitment().is_some() {
                        tracing::warn!(
                            token_id = %token_id,
                            status = %status,
                            "finishing stuck staging record that already committed"
                        );
                        match self.finish_committed(&record).await {
                            Some(completed) => self.settle_recovered(&completed, &mut report).await,
                            None => report
                                .errors
                                .push((token_id, "committed record could not be completed".to_string())),
                        }
                        continue;
                    }
                    match self.abandon_stuck(token_id, status).await {
                        Ok(_) => report.abandoned.push(token_id),
                        Err(e) => report.errors.push((token_id, e.to_string())),
                    }
                }
                _ => report.in_flight.push(token_id),
            }
        }
        tracing::info!(
            promoted = report.promoted.len(),
            abandoned = report.abandoned.len(),
            failed_left = report.failed_left.len(),
            in_flight = report.in_flight.len(),
            errors = report.errors.len(),
            "staging recovery sweep finished"
        );
        Ok(report)
    }

    async fn settle_recovered(&self, record: &StagingMovement, report: &mut RecoveryReport) {
        let token_id = record.token_id;
        match self.settle(Some(record), Self::retry_entry_for(record)).await {
            Ok(Settlement { promoted: true }) => report.promoted.push(token_id),
            Ok(Settlement { promoted: false }) => report
                .errors
                .push((token_id, "promotion did not complete".to_string())),
            Err(e) => report.errors.push((token_id, e.to_string())),
        }
    }

    /// Complete a committed record abandoned mid-flight. Without `metadata_set`
    /// there is no telling whether the metadata write landed, so it is queued
    /// for repair; writing the same URIs twice is harmless.
    async fn finish_committed(&self, record: &StagingMovement) -> Option<StagingMovement> {
        let patch = if record.status == MovementStatus::MetadataSet {
            StagingPatch::status(MovementStatus::Completed)
        } else {
            let reason = record
                .last_error
                .clone()
                .unwrap_or_else(|| METADATA_UNCONFIRMED.to_string());
            StagingPatch {
                status: Some(MovementStatus::Completed),
                ..StagingPatch::metadata_deferred(reason)
            }
        };
        self.reach(record.token_id, MovementStatus::Completed, patch).await
    }

    /// Mark a stuck record failed and drop its cached artifact. The failed
    /// record stays in place.
    async fn abandon_stuck(
        &self,
        token_id: TokenId,
        status: MovementStatus,
    ) -> Result<StagingMovement, StepFailure> {
        let limit = self.config.step_timeout;
        let reason = format!("stuck in {status} beyond {:?}", self.config.stuck_threshold);
        let outcome = bounded(
            Step::UpdateStaging,
            limit,
            self.staging
                .abandon(token_id, &reason, self.config.cas_max_retries),
        )
        .await?;
        let UpdateOutcome::Applied(abandoned) = outcome else {
            return Err(StepFailure::new(Step::UpdateStaging, not_applied(&outcome)));
        };
        bounded(Step::ClearArtifact, limit, self.cache.clear(token_id)).await?;
        Ok(abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), String>(())
        };
        let err = bounded(Step::Transfer, Duration::from_secs(1), slow)
            .await
            .unwrap_err();
        assert_eq!(err.step, Step::Transfer);
        assert!(err.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn bounded_flattens_inner_error() {
        let err = bounded(Step::WriteMetadata, Duration::from_secs(1), async {
            Err::<(), _>("reverted")
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "write_metadata: reverted");
    }

    #[test]
    fn not_applied_describes_outcome() {
        assert!(not_applied(&UpdateOutcome::Missing).contains("disappeared"));
        assert!(not_applied(&UpdateOutcome::Exhausted).contains("compare-and-swap"));
    }
}
