//! Schema command - prints the schema context the model sees.

use anyhow::{Result, bail};
use clap::Args;
use querypilot_agent::format_schema_context;
use querypilot_server::DataSource;

use super::Context;

/// Arguments for the schema command.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Data source id from the config
    pub data_source_id: String,

    /// Print the schema as JSON instead
    #[arg(long)]
    pub json: bool,
}

/// Run the schema command.
pub async fn run(args: SchemaArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    let Some(config) = loaded.config.data_source(&args.data_source_id) else {
        bail!("Data source '{}' not found.", args.data_source_id);
    };
    let source = DataSource::from_config(config)?;

    let Some(schema) = source.schema() else {
        bail!("Schema not available for data source '{}'.", source.id);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(schema.as_ref())?);
    } else {
        println!("{}", format_schema_context(&schema));
    }
    Ok(())
}
