//! ferrule-json binary entry point.

use std::process::ExitCode;

use clap::Parser;
use ferrule_json::{Cli, server, transport};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.load_config().await?;
    if let Some(path) = cli.write_config(&config).await? {
        eprintln!("Wrote configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let filter = match &cli.log_level {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_filter))?,
    };

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!(
        name = %config.server_name,
        version = %config.server_version,
        "Starting JSON language server"
    );

    let engine = server::build(config);
    let status = transport::run(engine, &cli.transport()).await?;

    tracing::info!(code = status.code(), "Server exited");
    Ok(status.into())
}
