//! # Read-only Subcommands
//!
//! `holder` and `token`, served from the durable read model.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use choo_core::{Timestamp, TokenId};
use choo_state::CurrentHolder;
use choo_store::ReadModel;

use crate::{print_json, Session};

#[derive(Serialize)]
struct HolderView {
    current: Option<CurrentHolder>,
    last_moved_at: Option<Timestamp>,
}

pub async fn run_holder(session: &Session) -> Result<u8> {
    let read_model = ReadModel::new(session.store.clone());
    let view = HolderView {
        current: read_model.current_holder().await?,
        last_moved_at: read_model.last_moved_at().await?,
    };
    print_json(&view)?;
    Ok(0)
}

/// Arguments for `choo token`.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Ticket id.
    pub id: TokenId,
}

pub async fn run_token(args: &TokenArgs, session: &Session) -> Result<u8> {
    let read_model = ReadModel::new(session.store.clone());
    match read_model.token(args.id).await? {
        Some(record) => {
            print_json(&record)?;
            Ok(0)
        }
        None => bail!("no durable record for token {}", args.id),
    }
}
