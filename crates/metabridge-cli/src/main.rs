//! metabridge
//!
//! Command-line front end for the Metabase authenticated request core. Logs go
//! to stderr; results go to stdout.

mod commands;
mod config;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::commands::{ExportArgs, QueryArgs};
use crate::config::{ConnectionArgs, LogFormat, LoggingArgs};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the URL and credentials against the current-user endpoint
    Check,
    /// Run the read-only SQL guard locally, without contacting Metabase
    Validate {
        /// SQL to check; `-` reads it from stdin
        #[arg(long)]
        sql: String,
    },
    /// Execute a query and print the JSON response
    Query(QueryArgs),
    /// Download query results as csv, json or xlsx
    Export(ExportArgs),
}

/// Initializes structured logging on stderr.
///
/// The level comes from `--log-level`/`LOG_LEVEL` unless `RUST_LOG` is set.
fn init_tracing(logging: &LoggingArgs) {
    use tracing_subscriber::fmt;

    let filter = logging.env_filter();

    match logging.log_format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

/// Cancels `cancel` on the first SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) -> Result<signal_hook_tokio::Handle> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    tokio::spawn(async move {
        use futures::stream::StreamExt;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => {
                    info!("Received SIGTERM, cancelling in-flight request");
                    cancel.cancel();
                    break;
                }
                SIGINT => {
                    info!("Received SIGINT, cancelling in-flight request");
                    cancel.cancel();
                    break;
                }
                _ => {}
            }
        }
    });
    Ok(handle)
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    if let Command::Validate { sql } = &cli.command {
        return commands::validate(sql, std::io::stdin(), &mut stdout);
    }

    let settings = cli.connection.validate()?;
    let client = commands::connect(&settings, cancel).await?;

    match cli.command {
        Command::Check => commands::check(&client, cancel, &mut stdout).await,
        Command::Query(args) => {
            let request = args.to_request(std::io::stdin())?;
            commands::query(&client, &request, cancel, &mut stdout).await
        }
        Command::Export(args) => {
            let request = args.query.to_request(std::io::stdin())?;
            commands::export(
                &client,
                &request,
                args.format,
                args.output.as_deref(),
                cancel,
                &mut stdout,
            )
            .await
        }
        Command::Validate { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.logging);

    let cancel = CancellationToken::new();
    let signals = match spawn_signal_handler(cancel.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(cli, &cancel).await;
    signals.close();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
