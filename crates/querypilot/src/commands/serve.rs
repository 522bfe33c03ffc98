//! Serve command - runs the assistant HTTP server.

use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use clap::Args;
use querypilot_config::AssistantSettings;
use querypilot_server::{AppState, DataSourceRegistry, Server, ServerConfig};

use super::Context;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides [server].bind)
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = loaded.config;

    let settings = AssistantSettings::resolve(&config);
    if settings.enabled && !settings.is_configured() {
        tracing::warn!("Assistant is enabled but no API key is configured");
    }
    if let Some(source) = &settings.api_key_source {
        tracing::info!(source = %source, "Using API key");
    }

    let mut server_config = ServerConfig::from_section(&config.server())?;
    if let Some(addr) = args.bind {
        server_config = server_config.with_bind_address(addr);
    }

    let sources = DataSourceRegistry::from_config(&config.data_sources)
        .context("Failed to open data sources")?;
    if sources.is_empty() {
        tracing::warn!("No data sources configured; add a [[data_source]] table to the config");
    }

    let server = Server::from_state(AppState::new(settings, server_config, sources));
    println!("querypilot listening on http://{}", server.bind_address());

    server.run().await?;
    Ok(())
}
