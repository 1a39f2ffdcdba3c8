//! Output format writers for display tables.
//!
//! - CSV
//! - NDJSON (Newline Delimited JSON)
//! - JSON Array

mod csv;
mod ndjson;

pub use csv::CsvWriter;
pub use ndjson::{JsonArrayWriter, NdjsonWriter};

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::table::DisplayTable;

/// Trait for writing display tables to different output formats.
pub trait OutputWriter: Send + Sync {
    /// Get the MIME content type for this format.
    fn content_type(&self) -> &'static str;

    /// Get the file extension for this format.
    fn file_extension(&self) -> &'static str;

    /// Write the table to the output.
    fn write(&self, table: &DisplayTable, output: &mut dyn Write) -> Result<()>;
}

/// Output format enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated values.
    Csv,

    /// Newline-delimited JSON.
    Ndjson,

    /// JSON array of records.
    #[default]
    Json,
}

impl OutputFormat {
    /// Parse an output format from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the format string is not recognized.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "json" => Ok(Self::Json),
            _ => Err(ExportError::Output(format!("Unknown format: {}", s))),
        }
    }

    /// Get the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Ndjson => "ndjson",
            Self::Json => "json",
        }
    }

    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Ndjson => "application/x-ndjson",
            Self::Json => "application/json",
        }
    }

    /// Get a writer for this format; `pretty` applies to the JSON formats.
    pub fn writer(&self, pretty: bool) -> Box<dyn OutputWriter> {
        match self {
            Self::Csv => Box::new(CsvWriter::new()),
            Self::Ndjson => Box::new(NdjsonWriter::new().with_pretty(pretty)),
            Self::Json => Box::new(JsonArrayWriter::new().with_pretty(pretty)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Get a writer for the specified format.
///
/// # Errors
///
/// Returns an error if the format is not recognized.
pub fn get_writer(format: &str) -> Result<Box<dyn OutputWriter>> {
    OutputFormat::parse(format).map(|f| f.writer(false))
}
