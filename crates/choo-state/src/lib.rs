//! # choo-state — Movement Data Model
//!
//! Pure data types for a train movement. Nothing in this crate performs I/O;
//! persistence and orchestration live in `choo-store` and `choo-train`.
//!
//! ## Records
//!
//! - **Status** (`status.rs`): `preparing → pinata_uploaded → minted →
//!   metadata_set → completed`, with `failed` reachable from every
//!   non-terminal status.
//!
//! - **Staging** (`staging.rs`): the in-flight record, mutated only through
//!   [`StagingPatch`] so every change bumps the version and is checked
//!   against the transition table.
//!
//! - **Durable** (`record.rs`): the write-once [`TokenRecord`] and the
//!   [`CurrentHolder`] pointer produced by promotion.
//!
//! - **Retry** (`retry.rs`): [`MetadataRetryEntry`] for deferred metadata
//!   writes.
//!
//! - **Workflow** (`workflow.rs`): the external [`WorkflowState`] flag.
//!
//! ## Design
//!
//! Staging records are reloaded from a shared store by whichever process
//! picks them up, so the status is a runtime enum with an explicit
//! transition table rather than a typestate. Invalid transitions surface as
//! [`TransitionError`] values.

pub mod record;
pub mod retry;
pub mod staging;
pub mod status;
pub mod workflow;

pub use record::{CurrentHolder, PromotionPreconditionError, TokenRecord};
pub use retry::MetadataRetryEntry;
pub use staging::{
    ArtifactRefs, Commitment, StagingMovement, StagingPatch, TicketAttribute, TokenIdSource,
};
pub use status::{MovementStatus, TransitionError, TransitionRecord};
pub use workflow::WorkflowState;
