use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use octofhir_export::{ExportService, FileExecutor, OutputFormat};

use crate::cli::ExportArgs;
use crate::commands::compile::load_request;
use crate::output::print_success;

pub async fn export(
    service: &ExportService,
    args: &ExportArgs,
    default_format: OutputFormat,
    default_pretty: bool,
) -> Result<()> {
    let request = load_request(&args.request)?;
    let executor = FileExecutor::new(&args.result);
    let table = service.export(&request, &executor, None).await?;

    let format = args.format.map(OutputFormat::from).unwrap_or(default_format);
    let pretty = args.pretty || default_pretty;
    let writer = format.writer(pretty);

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            writer.write(&table, &mut out)?;
            out.flush()?;
            print_success(&format!(
                "Exported {} patients to {} ({})",
                table.row_count(),
                path.display(),
                writer.content_type()
            ));
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writer.write(&table, &mut out)?;
            if format == OutputFormat::Json {
                writeln!(out)?;
            }
            out.flush()?;
        }
    }

    Ok(())
}
