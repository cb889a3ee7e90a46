//! Movement error taxonomy.

use std::time::Duration;

use choo_core::TokenId;
use choo_state::MovementStatus;
use choo_store::StagingError;

/// A point in the movement where an external call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    AcquireLock,
    RenewLock,
    ReleaseLock,
    PredictTokenId,
    ReadStaging,
    ResolveNewHolder,
    ResolveDepartingPassenger,
    CreateStaging,
    DiscardStaging,
    GenerateArtifact,
    ClearArtifact,
    UpdateStaging,
    Transfer,
    ReadMintedTokenId,
    VerifyNextTokenId,
    WriteMetadata,
    Promote,
    EnqueueRetry,
    RemoveRetry,
    ResetWorkflow,
    ListStaging,
    ListRetries,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcquireLock => "acquire_lock",
            Self::RenewLock => "renew_lock",
            Self::ReleaseLock => "release_lock",
            Self::PredictTokenId => "predict_token_id",
            Self::ReadStaging => "read_staging",
            Self::ResolveNewHolder => "resolve_new_holder",
            Self::ResolveDepartingPassenger => "resolve_departing_passenger",
            Self::CreateStaging => "create_staging",
            Self::DiscardStaging => "discard_staging",
            Self::GenerateArtifact => "generate_artifact",
            Self::ClearArtifact => "clear_artifact",
            Self::UpdateStaging => "update_staging",
            Self::Transfer => "transfer",
            Self::ReadMintedTokenId => "read_minted_token_id",
            Self::VerifyNextTokenId => "verify_next_token_id",
            Self::WriteMetadata => "write_metadata",
            Self::Promote => "promote",
            Self::EnqueueRetry => "enqueue_retry",
            Self::RemoveRetry => "remove_retry",
            Self::ResetWorkflow => "reset_workflow",
            Self::ListStaging => "list_staging",
            Self::ListRetries => "list_retries",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external call that failed or ran out of time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step}: {reason}")]
pub struct StepFailure {
    pub step: Step,
    pub reason: String,
}

impl StepFailure {
    pub fn new(step: Step, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }

    pub fn timed_out(step: Step, after: Duration) -> Self {
        Self::new(step, format!("timed out after {after:?}"))
    }
}

/// Why a movement (or a sweep) did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    /// Another orchestrator holds the lock. Back off and retry later.
    #[error("movement lock {scope} is held by another orchestrator")]
    LockConflict { scope: String },

    /// A live staging record already exists for the token. Back off.
    #[error("movement for token {token_id} is already in progress ({status})")]
    InProgress {
        token_id: TokenId,
        status: MovementStatus,
    },

    /// Failed before the on-chain transfer. Nothing was committed; safe to
    /// retry from scratch.
    #[error("movement failed before commitment: {0}")]
    PreCommit(StepFailure),

    /// A completed record could not be promoted because its contents are
    /// inconsistent.
    #[error("promotion precondition violated: {0}")]
    Fatal(StagingError),

    /// The store or a collaborator could not be reached outside a
    /// movement's body: taking a lock, or listing a sweep's work.
    #[error("{0}")]
    Unavailable(StepFailure),
}

impl MovementError {
    /// Whether the caller should simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockConflict { .. } | Self::InProgress { .. } | Self::PreCommit(_) | Self::Unavailable(_)
        )
    }
}
