//! # choo CLI entry point
//!
//! Parses command-line arguments, installs logging, opens the shared store
//! and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use choo_cli::inspect::{run_holder, run_token, TokenArgs};
use choo_cli::movement::{run_move, run_recover, MoveArgs};
use choo_cli::retry::{run_retry, RetryArgs};
use choo_cli::staging::{run_staging, StagingArgs};
use choo_cli::Session;

/// choo train operator CLI.
///
/// Inspects and drives train movements. Reads `CHOO_*` variables for
/// collaborator URLs and tuning; see `TrainConfig` and `ClientConfig`.
#[derive(Parser, Debug)]
#[command(name = "choo", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// PostgreSQL connection string. Without it the store is in-memory and
    /// private to this process.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current holder and when the train last moved.
    Holder,

    /// Show the durable record of one ticket.
    Token(TokenArgs),

    /// Inspect or abandon staging records.
    Staging(StagingArgs),

    /// Inspect or drain the metadata retry queue.
    Retry(RetryArgs),

    /// Promote completed movements and reclaim stuck ones.
    Recover,

    /// Move the train.
    #[command(name = "move")]
    Move(MoveArgs),
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let session = match Session::open(cli.database_url.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    let result = match &cli.command {
        Commands::Holder => run_holder(&session).await,
        Commands::Token(args) => run_token(args, &session).await,
        Commands::Staging(args) => run_staging(args, &session).await,
        Commands::Retry(args) => run_retry(args, &session).await,
        Commands::Recover => run_recover(&session).await,
        Commands::Move(args) => run_move(args, &session).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
