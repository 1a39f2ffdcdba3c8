mod cli;
mod commands;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use octofhir_export::config::loader;
use octofhir_export::{AttributeMapping, ExportService, ServiceOptions};

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = loader::load_config(cli.config.as_deref())?;
    if let Some(path) = &cli.mapping {
        config.mapping.path = path.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    observability::init_tracing(&config.logging.level);

    let mapping = AttributeMapping::from_path(&config.mapping.path, &config.mapping.patient_resource)
        .with_context(|| format!("Failed to load mapping {}", config.mapping.path.display()))?;
    let mapping = Arc::new(mapping);

    match &cli.command {
        Commands::Attributes => {
            commands::attributes::list(&mapping)?;
        }
        Commands::Compile(args) => {
            let service = make_service(mapping, &config)?;
            commands::compile::compile(&service, args)?;
        }
        Commands::Export(args) => {
            let service = make_service(mapping, &config)?;
            commands::export::export(&service, args, config.output.format, config.output.pretty)
                .await?;
        }
    }

    Ok(())
}

fn make_service(
    mapping: Arc<AttributeMapping>,
    config: &octofhir_export::ExportConfig,
) -> Result<ExportService> {
    let options = ServiceOptions {
        identifier_attribute: config.mapping.identifier_attribute.clone(),
        reshape: config.reshape_options(),
    };
    Ok(ExportService::new(mapping, options)?)
}
