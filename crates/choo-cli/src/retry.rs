//! # Retry Subcommand
//!
//! - `list` — Pending metadata retries, oldest token first.
//! - `sweep` — Retry every pending metadata write once.

use anyhow::Result;
use clap::{Args, Subcommand};

use choo_store::MetadataRetryQueue;

use crate::{print_json, tempfail_code, Session};

/// Arguments for the `choo retry` subcommand.
#[derive(Args, Debug)]
pub struct RetryArgs {
    #[command(subcommand)]
    pub command: RetryCommand,
}

#[derive(Subcommand, Debug)]
pub enum RetryCommand {
    /// List pending metadata retries.
    List,
    /// Retry pending metadata writes against the contract.
    Sweep,
}

pub async fn run_retry(args: &RetryArgs, session: &Session) -> Result<u8> {
    match args.command {
        RetryCommand::List => {
            let queue = MetadataRetryQueue::new(session.store.clone(), session.config.retry_retention);
            print_json(&queue.pending().await?)?;
            Ok(0)
        }
        RetryCommand::Sweep => {
            let sweeper = session.orchestrator()?.repair_sweeper();
            match sweeper.sweep().await {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(if report.failed.is_empty() { 0 } else { 1 })
                }
                Err(e) => match tempfail_code(&e) {
                    Some(code) => {
                        tracing::warn!(error = %e, "another repair sweep is running");
                        Ok(code)
                    }
                    None => Err(e.into()),
                },
            }
        }
    }
}
