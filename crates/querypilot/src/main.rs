//! querypilot - SQL assistant server for local data sources
//!
//! Main entry point for the querypilot CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{check_key, schema, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// querypilot - SQL assistant server for local data sources
#[derive(Parser)]
#[command(name = "querypilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding the user config.toml
    #[arg(long, global = true, env = "QUERYPILOT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the assistant server
    Serve(serve::ServeArgs),

    /// Print the schema context for a data source
    Schema(schema::SchemaArgs),

    /// Verify the configured API key
    CheckKey(check_key::CheckKeyArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "querypilot=debug,querypilot_agent=debug,querypilot_llm=debug,querypilot_server=debug,querypilot_config=debug,tower_http=debug,info"
    } else {
        "querypilot=info,querypilot_agent=info,querypilot_llm=info,querypilot_server=info,warn"
    };

    let log_dir = cli
        .config_dir
        .clone()
        .or_else(querypilot_config::xdg_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "querypilot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "querypilot=trace,querypilot_agent=trace,querypilot_llm=trace,querypilot_server=trace,querypilot_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_dir: cli.config_dir,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Schema(args) => schema::run(args, &ctx).await,
        Commands::CheckKey(args) => check_key::run(args, &ctx).await,
    }
}
