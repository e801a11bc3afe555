//! scanflow CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use scanflow::cli::LogFormat;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = scanflow::cli::parse_cli();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries the outcome table, diagnostics go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    let status = scanflow::cli::run_with_cli(cli).await?;
    Ok(status.into())
}
