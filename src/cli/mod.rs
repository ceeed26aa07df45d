//! CLI module for deckhand
//!
//! Provides commands:
//! - `serve`: Start the control server (default)
//! - `check-config`: Print the effective configuration
//! - `doctor`: System diagnostics and health checks

use clap::{Parser, Subcommand};

pub mod doctor;

/// Deckhand liquid-handling robot server
#[derive(Parser, Debug)]
#[command(name = "deckhand")]
#[command(about = "Control server for a liquid-handling robot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Validate and print the effective configuration
    CheckConfig,
    /// Run system diagnostics
    Doctor,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) | None => crate::server::run().await,
        Some(Commands::CheckConfig) => check_config(),
        Some(Commands::Doctor) => doctor::run().await,
    }
}

fn check_config() -> anyhow::Result<()> {
    let config = crate::server::load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    println!("✅ Configuration is valid");
    Ok(())
}
