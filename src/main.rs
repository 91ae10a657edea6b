use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plover::cli;
use plover::node::NodeController;
use plover::settings::LogFormat;
use plover::transport::{spawn_stdin_reader, StdioTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();

    // stdout carries protocol traffic, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plover=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    settings.validate().context("invalid settings")?;

    let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
    let reader = spawn_stdin_reader(command_tx);

    info!("Starting {} {}", cli::APP_NAME, cli::APP_VERSION);
    let controller = NodeController::new(settings, Arc::new(StdioTransport::new()));
    controller.start(command_rx).await;

    reader.abort();
    Ok(())
}
