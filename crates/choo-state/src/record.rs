//! # Durable Records
//!
//! What a completed movement leaves behind once its staging record is
//! promoted: the write-once [`TokenRecord`] and the [`CurrentHolder`]
//! pointer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use choo_core::{OperationKind, ParticipantSnapshot, Timestamp, TokenId, TxHash};

use crate::staging::{ArtifactRefs, StagingMovement, TokenIdSource};
use crate::status::MovementStatus;

/// A staging record cannot be promoted.
///
/// Reaching promotion with any of these is a logic error in the caller,
/// never a transient condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromotionPreconditionError {
    #[error("staging record for token {token_id} is {status}, expected completed")]
    NotCompleted {
        token_id: TokenId,
        status: MovementStatus,
    },
    #[error("staging record for token {0} has no artifact references")]
    MissingArtifact(TokenId),
    #[error("staging record for token {0} has no commitment")]
    MissingCommitment(TokenId),
}

/// Permanent record of one completed movement. Write-once per token id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: TokenId,
    pub artifact: ArtifactRefs,
    pub new_holder: ParticipantSnapshot,
    pub departing_passenger: ParticipantSnapshot,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub token_id_source: TokenIdSource,
    pub operation_kind: OperationKind,
    pub moved_at: Timestamp,
}

impl TokenRecord {
    /// Build the durable record from a completed staging record.
    ///
    /// The record is keyed by the minted token id from the commitment, which
    /// equals the staging key unless the prediction drifted.
    pub fn from_staging(
        staging: &StagingMovement,
        moved_at: Timestamp,
    ) -> Result<Self, PromotionPreconditionError> {
        if staging.status != MovementStatus::Completed {
            return Err(PromotionPreconditionError::NotCompleted {
                token_id: staging.token_id,
                status: staging.status,
            });
        }
        let artifact = staging
            .trusted_artifact()
            .ok_or(PromotionPreconditionError::MissingArtifact(staging.token_id))?;
        let commitment = staging
            .trusted_commitment()
            .ok_or(PromotionPreconditionError::MissingCommitment(staging.token_id))?;

        Ok(Self {
            token_id: commitment.minted_token_id,
            artifact: artifact.clone(),
            new_holder: staging.new_holder.clone(),
            departing_passenger: staging.departing_passenger.clone(),
            tx_hash: commitment.tx_hash.clone(),
            block_number: commitment.block_number,
            token_id_source: commitment.token_id_source,
            operation_kind: staging.operation_kind,
            moved_at,
        })
    }

    /// The pointer value this movement installs.
    pub fn current_holder(&self) -> CurrentHolder {
        CurrentHolder {
            holder: self.new_holder.clone(),
            token_id: self.token_id,
            tx_hash: self.tx_hash.clone(),
            since: self.moved_at,
        }
    }
}

/// Who holds the train right now, and which movement put them there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentHolder {
    pub holder: ParticipantSnapshot,
    pub token_id: TokenId,
    pub tx_hash: TxHash,
    pub since: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::fixtures::*;
    use crate::staging::StagingPatch;

    fn completed(id: u64) -> StagingMovement {
        let mut r = record(id);
        let now = Timestamp::now();
        r.apply(&StagingPatch::uploaded(artifact()), now).unwrap();
        r.apply(&StagingPatch::minted(commitment(id)), now).unwrap();
        r.apply(&StagingPatch::status(MovementStatus::Completed), now)
            .unwrap();
        r
    }

    #[test]
    fn completed_record_promotes() {
        let staging = completed(42);
        let now = Timestamp::now();
        let rec = TokenRecord::from_staging(&staging, now).unwrap();
        assert_eq!(rec.token_id, TokenId::new(42));
        assert_eq!(rec.artifact.token_uri, "ipfs://QmMeta");
        assert_eq!(rec.block_number, 1_234);

        let holder = rec.current_holder();
        assert_eq!(holder.holder, staging.new_holder);
        assert_eq!(holder.since, now);
    }

    #[test]
    fn non_completed_is_rejected() {
        let mut staging = completed(42);
        staging.status = MovementStatus::Minted;
        let err = TokenRecord::from_staging(&staging, Timestamp::now()).unwrap_err();
        assert!(matches!(err, PromotionPreconditionError::NotCompleted { .. }));
    }

    #[test]
    fn missing_commitment_is_rejected() {
        let mut staging = completed(42);
        staging.commitment = None;
        let err = TokenRecord::from_staging(&staging, Timestamp::now()).unwrap_err();
        assert_eq!(err, PromotionPreconditionError::MissingCommitment(TokenId::new(42)));
    }

    #[test]
    fn missing_artifact_is_rejected() {
        let mut staging = completed(42);
        staging.artifact = None;
        let err = TokenRecord::from_staging(&staging, Timestamp::now()).unwrap_err();
        assert_eq!(err, PromotionPreconditionError::MissingArtifact(TokenId::new(42)));
    }

    #[test]
    fn record_is_keyed_by_minted_id() {
        let mut staging = completed(42);
        if let Some(c) = staging.commitment.as_mut() {
            c.minted_token_id = TokenId::new(43);
        }
        let rec = TokenRecord::from_staging(&staging, Timestamp::now()).unwrap();
        assert_eq!(rec.token_id, TokenId::new(43));
    }
}
