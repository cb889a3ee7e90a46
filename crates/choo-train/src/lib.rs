//! # choo-train — Train Movement Orchestration
//!
//! Moves the train from its current holder to a new one, minting a ticket
//! for the departing passenger, and keeps the shared state consistent when
//! orchestrators crash, race or stall.
//!
//! ## Components
//!
//! - **Orchestrator** (`orchestrator.rs`): [`TrainOrchestrator::move_train`]
//!   runs one movement through lock, staging, generation, transfer, metadata
//!   and promotion. [`TrainOrchestrator::recover_stale`] finishes or reclaims
//!   records left behind by earlier attempts.
//!
//! - **Repair** (`repair.rs`): [`MetadataRepairSweeper`] drains the metadata
//!   retry queue.
//!
//! - **Announcements** (`notify.rs`): detached posts after promotion.
//!
//! - **Lease renewal** (`lease.rs`): keeps a held lock alive for as long as
//!   the movement or sweep behind it runs.
//!
//! ## Crate Policy
//!
//! - Depends on collaborator traits only; HTTP adapters are injected.
//! - Errors before the on-chain transfer are [`MovementError`]s; shortfalls
//!   after it are reported in [`MovementOutcome`].
//! - No `.unwrap()` outside tests.

pub mod config;
pub mod error;
pub(crate) mod lease;
pub(crate) mod notify;
pub mod orchestrator;
pub mod outcome;
pub mod repair;
pub mod request;

pub use config::{ConfigError, TrainConfig};
pub use error::{MovementError, Step, StepFailure};
pub use orchestrator::{Collaborators, TrainOrchestrator};
pub use outcome::{MovementOutcome, RecoveryReport, RepairReport};
pub use repair::MetadataRepairSweeper;
pub use request::MovementRequest;
