//! CLI command definitions and dispatch.

pub mod check;
pub mod seed;
pub mod serve;
pub mod simulate;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use enrollhub_core::config::AppConfig;
use enrollhub_core::error::AppError;

/// EnrollHub: course enrollment admission control
#[derive(Debug, Parser)]
#[command(name = "enrollhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the EnrollHub server
    Serve(serve::ServeArgs),
    /// Run a concurrency scenario against an in-memory core
    Simulate(simulate::SimulateArgs),
    /// Load the configured snapshot and audit its consistency
    Check(check::CheckArgs),
    /// Inspect seed data
    Seed(seed::SeedArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Serve(args) => serve::execute(args, &self.config).await,
            Commands::Simulate(args) => simulate::execute(args, &self.config, self.format).await,
            Commands::Check(args) => check::execute(args, &self.config, self.format).await,
            Commands::Seed(args) => seed::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file, with the `ENROLLHUB_ENV` overlay.
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    let env = std::env::var("ENROLLHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load_from(config_path, &env)
}
