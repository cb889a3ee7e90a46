//! # choo-cli — Operator Tool for the choo Train
//!
//! Provides the `choo` command-line interface over the shared store and the
//! collaborator services.
//!
//! ## Subcommands
//!
//! - `choo holder` — Current holder pointer and last movement time.
//! - `choo token <ID>` — Durable record of one ticket.
//! - `choo staging list|abandon` — Inspect or abandon in-flight movements.
//! - `choo retry list|sweep` — Inspect or drain the metadata retry queue.
//! - `choo recover` — Finish or reclaim stale staging records.
//! - `choo move` — Move the train.
//!
//! Every command prints JSON to stdout; logs go to stderr.
//!
//! ```bash
//! choo staging list --stuck
//! choo move --to 4821 --kind yoink
//! DATABASE_URL=postgres://... choo recover
//! ```

pub mod inspect;
pub mod movement;
pub mod retry;
pub mod staging;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use choo_client::{ChooClient, ClientConfig};
use choo_store::KvStore;
use choo_train::{Collaborators, MovementError, TrainConfig, TrainOrchestrator};

/// Exit code for "try again later" outcomes (lock held, movement in flight).
pub const EXIT_TEMPFAIL: u8 = 75;

/// Shared handles every subcommand works from.
pub struct Session {
    pub store: Arc<dyn KvStore>,
    pub config: TrainConfig,
}

impl Session {
    /// Open the store (PostgreSQL when `database_url` is set) and load the
    /// orchestrator configuration from the environment.
    pub async fn open(database_url: Option<&str>) -> Result<Self> {
        let config = TrainConfig::from_env().context("invalid train configuration")?;
        let store = choo_store::open(database_url)
            .await
            .context("failed to open store")?;
        Ok(Self { store, config })
    }

    pub fn with_store(store: Arc<dyn KvStore>, config: TrainConfig) -> Self {
        Self { store, config }
    }

    /// An orchestrator wired to the HTTP collaborators configured in the
    /// environment.
    pub fn orchestrator(&self) -> Result<TrainOrchestrator> {
        let client_config = ClientConfig::from_env().context("invalid collaborator configuration")?;
        tracing::debug!(config = ?client_config, "collaborator configuration loaded");
        let client = ChooClient::new(client_config).context("failed to build HTTP client")?;
        Ok(TrainOrchestrator::new(
            self.store.clone(),
            Collaborators::from_client(&client),
            self.config.clone(),
        ))
    }
}

/// The exit code for an error that only means "not now": the lock is held
/// or a movement is already in flight. `None` for real failures.
pub fn tempfail_code(error: &MovementError) -> Option<u8> {
    match error {
        MovementError::LockConflict { .. } | MovementError::InProgress { .. } => Some(EXIT_TEMPFAIL),
        MovementError::PreCommit(_) | MovementError::Fatal(_) | MovementError::Unavailable(_) => None,
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use choo_core::TokenId;
    use choo_state::MovementStatus;
    use choo_state::PromotionPreconditionError;
    use choo_store::StagingError;
    use choo_train::{Step, StepFailure};

    #[test]
    fn busy_outcomes_map_to_tempfail() {
        let conflict = MovementError::LockConflict {
            scope: "train".into(),
        };
        let in_progress = MovementError::InProgress {
            token_id: TokenId::new(42),
            status: MovementStatus::Minted,
        };
        assert_eq!(tempfail_code(&conflict), Some(EXIT_TEMPFAIL));
        assert_eq!(tempfail_code(&in_progress), Some(EXIT_TEMPFAIL));
    }

    #[test]
    fn real_failures_have_no_tempfail_code() {
        let failure = StepFailure::new(Step::Transfer, "execution reverted");
        assert_eq!(tempfail_code(&MovementError::PreCommit(failure.clone())), None);
        assert_eq!(tempfail_code(&MovementError::Unavailable(failure)), None);
        let fatal = MovementError::Fatal(StagingError::PromotionPrecondition(
            PromotionPreconditionError::MissingCommitment(TokenId::new(1)),
        ));
        assert_eq!(tempfail_code(&fatal), None);
    }
}
