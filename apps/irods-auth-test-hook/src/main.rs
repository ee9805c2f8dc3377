use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use auth_conformance::domain::EXIT_CONFIG;
use irods_auth_test_hook::logging::init_tracing;
use irods_auth_test_hook::{Cli, HookConfig, LoggingConfig, run_hook};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            if let Err(print_err) = e.print() {
                eprintln!("{e}: {print_err}");
            }
            return exit_code(EXIT_CONFIG);
        }
    };

    let config = HookConfig::load(cli.config.as_deref());
    let logging = if let Ok(config) = &config {
        config.logging.clone()
    } else {
        LoggingConfig::default()
    };
    if let Err(e) = init_tracing(&logging) {
        eprintln!("failed to initialise logging: {e}");
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Invalid configuration");
            return exit_code(EXIT_CONFIG);
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping tests and tearing down");
            on_interrupt.cancel();
        }
    });

    exit_code(run_hook(&cli, &config, &cancel).await)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
