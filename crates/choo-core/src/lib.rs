//! # choo-core — Foundational Types for the choo Train
//!
//! This crate defines the primitives every other crate in the workspace
//! shares. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `TokenId`, `UserId`, `Address`,
//!    `TxHash`. No bare integers or strings cross a crate boundary.
//!
//! 2. **Validated, normalized construction.** Addresses and transaction
//!    hashes are checked and lowercased once, when built; storage keys and
//!    equality never depend on the caller's casing.
//!
//! 3. **UTC-only timestamps.** `Timestamp` is millisecond-precision UTC so
//!    staleness arithmetic is consistent across processes.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `choo-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod operation;
pub mod participant;
pub mod temporal;

pub use error::ValidationError;
pub use identity::{Address, TokenId, TxHash, UserId};
pub use operation::OperationKind;
pub use participant::ParticipantSnapshot;
pub use temporal::Timestamp;
