//! # Movement Subcommands
//!
//! - `move` — Move the train to a user.
//! - `recover` — Finish completed movements and reclaim stuck ones.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use choo_client::{ChooClient, ClientConfig, ContractService, IdentityResolver};
use choo_core::{OperationKind, UserId};
use choo_store::{LockScope, ReadModel};
use choo_train::MovementRequest;

use crate::{print_json, tempfail_code, Session};

/// Which lock a movement takes.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeArg {
    /// Serialize against every movement of the train.
    Train,
    /// Serialize only against movements between the same two addresses.
    Pair,
}

/// Arguments for `choo move`.
#[derive(Args, Debug)]
pub struct MoveArgs {
    /// User id of the new holder.
    #[arg(long)]
    pub to: UserId,
    /// How the movement was initiated (manual_send, chance_send, admin_send, yoink).
    #[arg(long)]
    pub kind: OperationKind,
    #[arg(long, value_enum, default_value_t = ScopeArg::Train)]
    pub scope: ScopeArg,
}

pub async fn run_move(args: &MoveArgs, session: &Session) -> Result<u8> {
    let orchestrator = session.orchestrator()?;
    let mut request = MovementRequest::new(args.to, args.kind);
    if args.scope == ScopeArg::Pair {
        request = request.with_scope(pair_scope(args.to, session).await?);
    }

    match orchestrator.move_train(&request).await {
        Ok(outcome) => {
            print_json(&outcome)?;
            Ok(0)
        }
        Err(e) => match tempfail_code(&e) {
            Some(code) => {
                tracing::warn!(error = %e, "movement not started, try again later");
                Ok(code)
            }
            None => Err(e.into()),
        },
    }
}

/// Lock scope for the current holder and the recipient's address.
async fn pair_scope(to: UserId, session: &Session) -> Result<LockScope> {
    let client = ChooClient::new(ClientConfig::from_env()?)?;
    let recipient = client
        .identity()
        .resolve_user(to)
        .await
        .with_context(|| format!("failed to resolve user {to}"))?;
    let from = match ReadModel::new(session.store.clone()).current_holder().await? {
        Some(current) => current.holder.address,
        None => client
            .contract()
            .current_holder()
            .await
            .context("failed to read on-chain holder")?,
    };
    Ok(LockScope::Pair {
        from,
        to: recipient.address,
    })
}

pub async fn run_recover(session: &Session) -> Result<u8> {
    let report = session.orchestrator()?.recover_stale().await?;
    print_json(&report)?;
    Ok(if report.is_clean() { 0 } else { 1 })
}
