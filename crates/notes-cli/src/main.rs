//! notes: keep short notes in object storage.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use notes_cli::signal::cancel_on_interrupt;
use notes_cli::{Args, CliError, Config};
use notes_core::CancellationToken;
use notes_gateway::GatewayNetwork;
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose
    let default_filter = if verbose {
        "info,notes=debug,notes_cli=debug,notes_core=debug,notes_gateway=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            let err = CliError::from(e);
            eprintln!("{}\n", err);
            eprintln!("{}", Args::command().render_help());
            return ExitCode::from(err.exit_code());
        }
    };

    let cancel = CancellationToken::new();
    let watcher = cancel_on_interrupt(cancel.clone());

    let network = GatewayNetwork::new(config.auth_service.as_str());
    debug!(auth_service = network.auth_service(), "using gateway network");

    let mut stdout = std::io::stdout();
    let result = notes_cli::run(&config, &network, &cancel, &mut stdout).await;
    watcher.abort();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
