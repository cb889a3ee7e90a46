//! # Staging Subcommand
//!
//! - `list` — All staging records, optionally only the stuck ones.
//! - `abandon` — Mark one record failed with an operator reason.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use choo_core::TokenId;
use choo_store::{StagingStore, UpdateOutcome};

use crate::{print_json, Session};

/// Arguments for the `choo staging` subcommand.
#[derive(Args, Debug)]
pub struct StagingArgs {
    #[command(subcommand)]
    pub command: StagingCommand,
}

#[derive(Subcommand, Debug)]
pub enum StagingCommand {
    /// List staging records.
    List {
        /// Only records older than the stuck threshold.
        #[arg(long)]
        stuck: bool,
    },
    /// Mark a staging record failed.
    Abandon {
        /// Token id the record is staged under.
        id: TokenId,
        /// Why the operator abandoned it.
        #[arg(long)]
        reason: String,
    },
}

pub async fn run_staging(args: &StagingArgs, session: &Session) -> Result<u8> {
    let staging = StagingStore::new(session.store.clone(), session.config.staging_ttl);
    match &args.command {
        StagingCommand::List { stuck } => {
            let mut records = staging.list().await?;
            if *stuck {
                records.retain(|r| staging.is_stuck(r, session.config.stuck_threshold));
            }
            print_json(&records)?;
            Ok(0)
        }
        StagingCommand::Abandon { id, reason } => {
            let reason = format!("operator: {reason}");
            match staging
                .abandon(*id, &reason, session.config.cas_max_retries)
                .await?
            {
                UpdateOutcome::Applied(record) => {
                    print_json(&record)?;
                    Ok(0)
                }
                UpdateOutcome::Missing => bail!("no staging record for token {id}"),
                UpdateOutcome::Rejected(e) => bail!("cannot abandon token {id}: {e}"),
                UpdateOutcome::Exhausted => bail!("token {id} is being updated concurrently, try again"),
            }
        }
    }
}
