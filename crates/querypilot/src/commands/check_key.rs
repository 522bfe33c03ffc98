//! Check-key command - probes the model API with the configured key.

use anyhow::{Result, bail};
use clap::Args;
use querypilot_config::AssistantSettings;
use querypilot_server::{AppState, DataSourceRegistry, KeyCheck, ServerConfig, check_api_key};

use super::Context;

/// Arguments for the check-key command.
#[derive(Args, Debug)]
pub struct CheckKeyArgs {
    /// Key to test instead of the configured one
    #[arg(long)]
    pub api_key: Option<String>,
}

/// Run the check-key command.
pub async fn run(args: CheckKeyArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let settings = AssistantSettings::resolve(&loaded.config);

    let key = args
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| settings.api_key.clone());
    let model = settings.model.clone();

    let check = match key {
        None => KeyCheck::missing_key(),
        Some(key) => {
            let state = AppState::new(settings, ServerConfig::new(), DataSourceRegistry::new());
            match state.backend(&key) {
                Ok(backend) => check_api_key(&backend, &model).await,
                Err(e) => KeyCheck::from_error(&e),
            }
        }
    };

    match &check.model {
        Some(model) => println!("{} (model: {})", check.message, model),
        None => println!("{}", check.message),
    }

    if !check.success {
        bail!("API key check failed");
    }
    Ok(())
}
