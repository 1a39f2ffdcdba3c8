//! CSV output writer for display tables.

use std::io::Write;

use serde_json::Value;

use super::OutputWriter;
use crate::error::{ExportError, Result};
use crate::table::DisplayTable;

/// CSV output writer configuration.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    /// Whether to include a header row.
    pub include_header: bool,

    /// Field delimiter (default: comma).
    pub delimiter: u8,

    /// Separator between the values of a multi-valued cell (default: `;`).
    pub list_separator: String,
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self {
            include_header: true,
            delimiter: b',',
            list_separator: ";".to_string(),
        }
    }
}

impl CsvWriter {
    /// Create a new CSV writer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to include a header row.
    pub fn with_header(mut self, include: bool) -> Self {
        self.include_header = include;
        self
    }

    /// Set the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the separator used inside multi-valued cells.
    pub fn with_list_separator(mut self, separator: impl Into<String>) -> Self {
        self.list_separator = separator.into();
        self
    }

    fn cell_to_string(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| self.cell_to_string(v))
                .collect::<Vec<_>>()
                .join(&self.list_separator),
            Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        }
    }
}

impl OutputWriter for CsvWriter {
    fn content_type(&self) -> &'static str {
        "text/csv; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, table: &DisplayTable, output: &mut dyn Write) -> Result<()> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(output);

        if self.include_header {
            writer
                .write_record(&table.columns)
                .map_err(|e| ExportError::Output(e.to_string()))?;
        }

        for row in &table.rows {
            let values: Vec<String> = row.iter().map(|v| self.cell_to_string(v)).collect();
            writer
                .write_record(&values)
                .map_err(|e| ExportError::Output(e.to_string()))?;
        }

        writer
            .flush()
            .map_err(|e| ExportError::Output(e.to_string()))?;

        Ok(())
    }
}
