//! notes-cli library: the command-line driver behind the `notes` binary.
//!
//! Kept as a library so integration tests can drive commands against any
//! storage network and capture their output.

pub mod args;
pub mod config;
pub mod error;
pub mod signal;

use std::io::Write;

use notes_core::note::format_timestamp;
use notes_core::{CancellationToken, Network, NoteMeta, Project, Service};
use tracing::{debug, warn};

pub use args::{Args, Command};
pub use config::{Config, DEFAULT_BUCKET, UsageError};
pub use error::CliError;

/// Resolve access, open the service, run the configured command and close.
///
/// The service is closed whether or not the command succeeded. A failed close
/// is logged and does not change the result.
pub async fn run<N, W>(
    config: &Config,
    network: &N,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), CliError>
where
    N: Network,
    W: Write,
{
    let access = config
        .access
        .resolve(network, cancel)
        .await
        .map_err(CliError::Access)?;

    let service = Service::open(cancel, network, &access, config.bucket.as_str())
        .await
        .map_err(CliError::Open)?;

    debug!(command = config.command.name(), bucket = %config.bucket, "running command");
    let result = execute(&service, config, cancel, out).await;

    if let Err(e) = service.close().await {
        warn!("failed to close service: {}", e);
    }
    result
}

async fn execute<P, W>(
    service: &Service<P>,
    config: &Config,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), CliError>
where
    P: Project,
    W: Write,
{
    match &config.command {
        Command::Get { identifier } => {
            let note = service
                .get(cancel, identifier)
                .await
                .map_err(|e| CliError::command("get note", identifier, e))?;
            if config.json {
                serde_json::to_writer(&mut *out, &note)?;
                writeln!(out)?;
            } else {
                writeln!(out, "{}", note.message)?;
            }
        }
        Command::Set { identifier, value } => {
            service
                .set(cancel, identifier, value)
                .await
                .map_err(|e| CliError::command("set note", identifier, e))?;
        }
        Command::List { prefix, long } => {
            let prefix = prefix.as_deref().unwrap_or_default();
            let notes = service
                .list(cancel, prefix)
                .await
                .map_err(|e| CliError::command("list notes under", prefix, e))?;
            for meta in &notes {
                print_meta(out, meta, config.json, *long)?;
            }
        }
        Command::Delete { identifier } => {
            service
                .delete(cancel, identifier)
                .await
                .map_err(|e| CliError::command("delete note", identifier, e))?;
        }
    }

    out.flush()?;
    Ok(())
}

fn print_meta<W: Write>(out: &mut W, meta: &NoteMeta, json: bool, long: bool) -> Result<(), CliError> {
    if json {
        serde_json::to_writer(&mut *out, meta)?;
        writeln!(out)?;
    } else if long {
        let uploaded = meta
            .uploaded
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "{}\t{}", meta.identifier, uploaded)?;
    } else {
        writeln!(out, "{}", meta.identifier)?;
    }
    Ok(())
}
