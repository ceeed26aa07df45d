//! Deckhand - liquid-handling robot control server
//!
//! CLI entry point for the deckhand server.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod server;
mod websocket;

use server::config::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Only the log format is needed here; commands load and report the config themselves
    let format = server::load_config()
        .map(|config| config.logging.format)
        .unwrap_or_default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "deckhand=info,deckhand_core=info,tower_http=info".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    let cli = cli::Cli::parse();
    cli::run(cli).await
}
