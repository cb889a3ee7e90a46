//! # Error Types — Validation Failures
//!
//! Defines the error returned when a domain primitive fails validation at
//! construction. All errors use `thiserror` for derive-based `Display` and
//! `Error` implementations.
//!
//! ## Design
//!
//! - Every variant carries the rejected input so log lines are actionable.
//! - Construction-time validation means downstream crates never re-check
//!   the shape of an address or hash.

use thiserror::Error;

/// A domain primitive was rejected at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Settlement address is not a 20-byte hex string with `0x` prefix.
    #[error("invalid address {value:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Transaction hash is not a 32-byte hex string with `0x` prefix.
    #[error("invalid transaction hash {value:?}: {reason}")]
    InvalidTxHash {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Token identifier could not be parsed.
    #[error("invalid token id {0:?}")]
    InvalidTokenId(String),

    /// User identifier could not be parsed.
    #[error("invalid user id {0:?}")]
    InvalidUserId(String),

    /// Timestamp could not be parsed or is not UTC.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Operation kind name is not one of the known kinds.
    #[error("unknown operation kind {0:?}")]
    UnknownOperationKind(String),
}
