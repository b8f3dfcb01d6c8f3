mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use quotamon_core::QuotaEngine;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Command::Watch(args) => args.log_file.as_deref(),
        _ => None,
    };
    let _guard = init_tracing(cli.global.verbose, log_file);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Stderr logging, plus a non-blocking file writer when `log_file` is set.
/// The returned guard flushes the file on drop.
fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("quotamon.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never touch the engine
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "quotamon", &mut std::io::stdout());
            Ok(())
        }

        Command::Discover => {
            let settings = config::resolve_settings(&cli.global)?;
            commands::discover::handle(&settings, &cli.global).await
        }

        Command::Status(args) => {
            let engine = QuotaEngine::new(config::resolve_settings(&cli.global)?)?;
            commands::status::handle(args, &engine, &cli.global).await
        }

        Command::Watch(args) => {
            let engine = QuotaEngine::new(config::resolve_settings(&cli.global)?)?;
            commands::watch::handle(args, &engine, &cli.global).await
        }
    }
}
