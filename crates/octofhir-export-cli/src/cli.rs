use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octofhir-export")]
#[command(about = "OctoFHIR export: patient attributes as flat tables")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "OCTOFHIR_EXPORT_CONFIG")]
    pub config: Option<String>,

    /// Attribute mapping document (overrides mapping.path)
    #[arg(short, long, global = true)]
    pub mapping: Option<PathBuf>,

    /// Log level (overrides logging.level; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the attributes defined in the mapping
    Attributes,
    /// Compile the query for a set of attributes
    Compile(CompileArgs),
    /// Reshape a recorded query result into the export table
    Export(ExportArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Csv,
    Ndjson,
    Json,
}

impl From<Format> for octofhir_export::OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => Self::Csv,
            Format::Ndjson => Self::Ndjson,
            Format::Json => Self::Json,
        }
    }
}

#[derive(clap::Args)]
pub struct ScopeArgs {
    /// Restrict to patients of a practitioner
    #[arg(long)]
    pub practitioner: Option<String>,
    /// Restrict to members of a group
    #[arg(long)]
    pub group: Option<String>,
    /// Birthdate comparison, e.g. ge2001-01-01
    #[arg(long)]
    pub birthdate: Option<String>,
}

#[derive(clap::Args)]
pub struct CompileArgs {
    /// Attribute to export (repeatable)
    #[arg(short, long = "attribute", conflicts_with = "request")]
    pub attributes: Vec<String>,
    /// Export request file (JSON)
    #[arg(short, long)]
    pub request: Option<PathBuf>,
    #[command(flatten)]
    pub scope: ScopeArgs,
}

#[derive(clap::Args)]
pub struct ExportArgs {
    /// Export request file (JSON)
    #[arg(short, long)]
    pub request: PathBuf,
    /// Recorded query result (JSON records or {columns, rows})
    #[arg(long)]
    pub result: PathBuf,
    /// Output format (overrides output.format)
    #[arg(short, long)]
    pub format: Option<Format>,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}
