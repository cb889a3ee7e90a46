//! # Movement Status Machine
//!
//! The lifecycle of one train-movement attempt, as persisted on the staging
//! record. Records are reloaded from the shared store by any process, so
//! the state is a runtime enum with an explicit transition table rather
//! than a compile-time typestate.
//!
//! ## States
//!
//! ```text
//! preparing ──▶ pinata_uploaded ──▶ minted ──▶ metadata_set ──▶ completed
//!     │               │               │  └───────────────────────▲
//!     │               │               │            │
//!     └───────────────┴───────────────┴────────────┴──▶ failed
//! ```
//!
//! `minted → completed` is the path taken when the best-effort metadata
//! write was deferred to the retry queue. `completed` and `failed` are
//! terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use choo_core::Timestamp;

/// Status of a staged movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    /// Participants captured; artifact not yet generated.
    Preparing,
    /// Artifact generated and pinned; artifact fields populated.
    PinataUploaded,
    /// On-chain transfer confirmed; commitment fields populated.
    Minted,
    /// On-chain ticket metadata written.
    MetadataSet,
    /// Ready for promotion. Terminal.
    Completed,
    /// Abandoned. Terminal; kept for inspection until cleared.
    Failed,
}

impl MovementStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [MovementStatus; 6] = [
        Self::Preparing,
        Self::PinataUploaded,
        Self::Minted,
        Self::MetadataSet,
        Self::Completed,
        Self::Failed,
    ];

    /// The canonical snake_case name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::PinataUploaded => "pinata_uploaded",
            Self::Minted => "minted",
            Self::MetadataSet => "metadata_set",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Convert a canonical name to a status. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Whether this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position along the happy path. `failed` is off the path.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Preparing => Some(0),
            Self::PinataUploaded => Some(1),
            Self::Minted => Some(2),
            Self::MetadataSet => Some(3),
            Self::Completed => Some(4),
            Self::Failed => None,
        }
    }

    /// Whether this status is at or beyond `other` on the happy path.
    ///
    /// Always `false` for `failed` on either side.
    pub fn has_reached(&self, other: MovementStatus) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// Return the set of valid target statuses from this status.
    pub fn valid_transitions(&self) -> &'static [MovementStatus] {
        match self {
            Self::Preparing => &[Self::PinataUploaded, Self::Failed],
            Self::PinataUploaded => &[Self::Minted, Self::Failed],
            Self::Minted => &[Self::MetadataSet, Self::Completed, Self::Failed],
            Self::MetadataSet => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    /// Whether `self → to` is allowed by the transition table.
    pub fn can_transition_to(&self, to: MovementStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a single status transition on a staging record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Status before the transition.
    pub from: MovementStatus,
    /// Status after the transition.
    pub to: MovementStatus,
    /// When the transition was written (UTC).
    pub at: Timestamp,
    /// Why the transition happened, when it is not self-evident.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A requested status change is not allowed by the transition table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid movement transition: {from} -> {to}")]
pub struct TransitionError {
    /// Current status.
    pub from: MovementStatus,
    /// Attempted target status.
    pub to: MovementStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn terminal_statuses_have_no_exits() {
        for s in MovementStatus::ALL {
            assert_eq!(s.is_terminal(), s.valid_transitions().is_empty(), "{s}");
        }
    }

    #[test]
    fn happy_path_is_allowed() {
        use MovementStatus::*;
        let path = [Preparing, PinataUploaded, Minted, MetadataSet, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn deferred_metadata_path_is_allowed() {
        assert!(MovementStatus::Minted.can_transition_to(MovementStatus::Completed));
    }

    #[test]
    fn cannot_skip_commitment() {
        assert!(!MovementStatus::Preparing.can_transition_to(MovementStatus::Minted));
        assert!(!MovementStatus::PinataUploaded.can_transition_to(MovementStatus::Completed));
    }

    #[test]
    fn failed_never_reaches_anything() {
        for s in MovementStatus::ALL {
            assert!(!MovementStatus::Failed.has_reached(s));
            assert!(!s.has_reached(MovementStatus::Failed));
        }
    }

    #[test]
    fn names_roundtrip_and_match_serde() {
        for s in MovementStatus::ALL {
            assert_eq!(MovementStatus::from_name(s.as_str()), Some(s));
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
        }
        assert_eq!(MovementStatus::from_name("PINATA_UPLOADED"), None);
    }

    fn any_status() -> impl Strategy<Value = MovementStatus> {
        prop::sample::select(MovementStatus::ALL.to_vec())
    }

    proptest! {
        /// Every non-failed transition moves strictly forward on the happy path.
        #[test]
        fn transitions_only_move_forward(from in any_status(), to in any_status()) {
            if from.can_transition_to(to) && to != MovementStatus::Failed {
                prop_assert!(to.rank() > from.rank());
            }
        }

        /// Every non-terminal status can be abandoned.
        #[test]
        fn non_terminal_can_fail(s in any_status()) {
            prop_assert_eq!(s.can_transition_to(MovementStatus::Failed), !s.is_terminal());
        }
    }
}
