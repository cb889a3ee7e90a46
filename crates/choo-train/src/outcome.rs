//! Results reported by the orchestrator and its sweeps.

use serde::Serialize;

use choo_core::{OperationKind, ParticipantSnapshot, TokenId, TxHash};
use choo_state::TokenIdSource;

/// A movement that reached the chain.
///
/// Shortfalls after commitment are reported here rather than as errors:
/// `metadata_deferred` means the metadata write was queued for repair,
/// `promoted == false` means the staging record is waiting for
/// [`recover_stale`](crate::TrainOrchestrator::recover_stale), either
/// completed but unpromoted or stopped short of `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementOutcome {
    /// Ticket id actually minted.
    pub token_id: TokenId,
    /// Id the contract predicted before the transfer; keys the staging record.
    pub staged_token_id: TokenId,
    pub token_id_source: TokenIdSource,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub operation_kind: OperationKind,
    pub new_holder: ParticipantSnapshot,
    pub departing_passenger: ParticipantSnapshot,
    pub metadata_deferred: bool,
    pub promoted: bool,
    /// The movement had already committed in an earlier attempt; this call
    /// only finished it.
    pub recovered: bool,
}

/// Result of [`TrainOrchestrator::recover_stale`](crate::TrainOrchestrator::recover_stale).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Records promoted by this sweep: completed ones, and stuck ones whose
    /// transfer had already committed.
    pub promoted: Vec<TokenId>,
    /// Stuck records marked failed.
    pub abandoned: Vec<TokenId>,
    /// Failed records left in place.
    pub failed_left: Vec<TokenId>,
    /// Records still within the stuck threshold.
    pub in_flight: Vec<TokenId>,
    /// Records the sweep could not handle, with the reason.
    pub errors: Vec<(TokenId, String)>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of [`MetadataRepairSweeper::sweep`](crate::MetadataRepairSweeper::sweep).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub repaired: Vec<TokenId>,
    pub failed: Vec<TokenId>,
}
