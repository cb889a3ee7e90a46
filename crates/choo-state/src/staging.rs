//! # Staging Movement Record
//!
//! The authoritative in-flight record for one train-movement attempt. It
//! answers "how far did this attempt get" for any process that picks the
//! token id up after a crash.
//!
//! ## Trust Rules
//!
//! - Artifact fields are only trusted once the status has reached
//!   `pinata_uploaded` ([`StagingMovement::trusted_artifact`]).
//! - Commitment fields are only trusted once the status has reached
//!   `minted` ([`StagingMovement::trusted_commitment`]).
//!
//! ## Versioning
//!
//! `version` starts at 1 and is incremented by every [`StagingMovement::apply`].
//! Stores persist the record with a compare-and-swap on the version that was
//! read, so a stale writer can never overwrite a newer state.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use choo_core::{OperationKind, ParticipantSnapshot, Timestamp, TokenId, TxHash};

use crate::status::{MovementStatus, TransitionError, TransitionRecord};

/// One trait of the generated ticket artwork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAttribute {
    pub trait_type: String,
    pub value: String,
}

/// References to the generated and pinned ticket artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRefs {
    /// Content hash of the pinned image.
    pub image_hash: String,
    /// Content hash of the pinned metadata document.
    pub metadata_hash: String,
    /// URI passed to the contract (`ipfs://<metadata_hash>`).
    pub token_uri: String,
    #[serde(default)]
    pub attributes: Vec<TicketAttribute>,
}

impl ArtifactRefs {
    /// URI of the ticket image.
    pub fn image_uri(&self) -> String {
        format!("ipfs://{}", self.image_hash)
    }
}

/// Where the minted token id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenIdSource {
    /// Read from the transaction receipt (authoritative).
    Receipt,
    /// Receipt lookup failed; the pre-transaction prediction was used.
    Predicted,
}

/// Proof that the on-chain transaction happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Ticket id actually minted by the transaction.
    pub minted_token_id: TokenId,
    pub token_id_source: TokenIdSource,
}

/// In-flight state of one movement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingMovement {
    /// Predicted ticket id; the staging key. Immutable.
    pub token_id: TokenId,
    pub status: MovementStatus,
    pub operation_kind: OperationKind,
    /// Optimistic-concurrency version; starts at 1.
    pub version: u64,
    /// Participant who receives the train.
    pub new_holder: ParticipantSnapshot,
    /// Participant who leaves the train and receives the ticket.
    pub departing_passenger: ParticipantSnapshot,
    #[serde(default)]
    pub artifact: Option<ArtifactRefs>,
    #[serde(default)]
    pub commitment: Option<Commitment>,
    #[serde(default)]
    pub needs_metadata_retry: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl StagingMovement {
    /// A fresh record in `preparing`, version 1.
    pub fn new(
        token_id: TokenId,
        operation_kind: OperationKind,
        new_holder: ParticipantSnapshot,
        departing_passenger: ParticipantSnapshot,
        now: Timestamp,
    ) -> Self {
        Self {
            token_id,
            status: MovementStatus::Preparing,
            operation_kind,
            version: 1,
            new_holder,
            departing_passenger,
            artifact: None,
            commitment: None,
            needs_metadata_retry: false,
            last_error: None,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            transitions: Vec::new(),
        }
    }

    /// Artifact references, if the status says they can be trusted.
    pub fn trusted_artifact(&self) -> Option<&ArtifactRefs> {
        if self.status.has_reached(MovementStatus::PinataUploaded) {
            self.artifact.as_ref()
        } else {
            None
        }
    }

    /// Commitment, if the status says it can be trusted.
    pub fn trusted_commitment(&self) -> Option<&Commitment> {
        if self.status.has_reached(MovementStatus::Minted) {
            self.commitment.as_ref()
        } else {
            None
        }
    }

    /// Older than `threshold` and not completed.
    pub fn is_stuck(&self, now: Timestamp, threshold: Duration) -> bool {
        self.status != MovementStatus::Completed && now.duration_since(self.created_at) > threshold
    }

    /// Apply `patch`, bumping `version` and `updated_at`.
    ///
    /// A status change is validated against the transition table and
    /// appended to the transition log. Setting the current status again is
    /// not a transition. On error the record is left untouched.
    pub fn apply(&mut self, patch: &StagingPatch, now: Timestamp) -> Result<(), TransitionError> {
        if let Some(to) = patch.status {
            if to != self.status {
                if !self.status.can_transition_to(to) {
                    return Err(TransitionError {
                        from: self.status,
                        to,
                    });
                }
                self.transitions.push(TransitionRecord {
                    from: self.status,
                    to,
                    at: now,
                    reason: patch.reason.clone(),
                });
                self.status = to;
            }
        }
        if let Some(artifact) = &patch.artifact {
            self.artifact = Some(artifact.clone());
        }
        if let Some(commitment) = &patch.commitment {
            self.commitment = Some(commitment.clone());
        }
        if let Some(flag) = patch.needs_metadata_retry {
            self.needs_metadata_retry = flag;
        }
        if let Some(err) = &patch.last_error {
            self.last_error = Some(err.clone());
        }
        if patch.increment_retry_count {
            self.retry_count = self.retry_count.saturating_add(1);
        }
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }
}

/// A partial update to a staging record.
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingPatch {
    pub status: Option<MovementStatus>,
    pub artifact: Option<ArtifactRefs>,
    pub commitment: Option<Commitment>,
    pub needs_metadata_retry: Option<bool>,
    pub last_error: Option<String>,
    pub increment_retry_count: bool,
    /// Recorded on the transition log entry when `status` changes.
    pub reason: Option<String>,
}

impl StagingPatch {
    /// A patch that only moves the status.
    pub fn status(status: MovementStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Move to `pinata_uploaded` with the generated artifact.
    pub fn uploaded(artifact: ArtifactRefs) -> Self {
        Self {
            artifact: Some(artifact),
            ..Self::status(MovementStatus::PinataUploaded)
        }
    }

    /// Move to `minted` with the observed commitment.
    pub fn minted(commitment: Commitment) -> Self {
        Self {
            commitment: Some(commitment),
            ..Self::status(MovementStatus::Minted)
        }
    }

    /// Flag the metadata write for out-of-band repair without changing status.
    pub fn metadata_deferred(error: impl Into<String>) -> Self {
        Self {
            needs_metadata_retry: Some(true),
            last_error: Some(error.into()),
            increment_retry_count: true,
            ..Self::default()
        }
    }

    /// Move to `failed`, recording why.
    pub fn abandoned(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            last_error: Some(reason.clone()),
            reason: Some(reason),
            ..Self::status(MovementStatus::Failed)
        }
    }
}
