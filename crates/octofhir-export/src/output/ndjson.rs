//! NDJSON and JSON array writers.

use std::io::Write;

use serde_json::Value;

use super::OutputWriter;
use crate::error::{ExportError, Result};
use crate::table::DisplayTable;

/// NDJSON output writer.
///
/// Writes each patient row as a JSON object on a separate line. Null cells
/// are left out of the object.
#[derive(Debug, Clone, Default)]
pub struct NdjsonWriter {
    /// Whether to pretty-print each JSON object.
    pub pretty: bool,
}

impl NdjsonWriter {
    /// Create a new NDJSON writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty-printing of JSON objects.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn row_to_object(columns: &[String], row: &[Value]) -> Value {
        let mut obj = serde_json::Map::new();
        for (column, value) in columns.iter().zip(row.iter()) {
            if !value.is_null() {
                obj.insert(column.clone(), value.clone());
            }
        }
        Value::Object(obj)
    }
}

impl OutputWriter for NdjsonWriter {
    fn content_type(&self) -> &'static str {
        "application/x-ndjson"
    }

    fn file_extension(&self) -> &'static str {
        "ndjson"
    }

    fn write(&self, table: &DisplayTable, output: &mut dyn Write) -> Result<()> {
        for row in &table.rows {
            let obj = Self::row_to_object(&table.columns, row);

            let line = if self.pretty {
                serde_json::to_string_pretty(&obj)
            } else {
                serde_json::to_string(&obj)
            }
            .map_err(|e| ExportError::Output(e.to_string()))?;

            writeln!(output, "{}", line).map_err(|e| ExportError::Output(e.to_string()))?;
        }

        Ok(())
    }
}

/// JSON array output writer.
///
/// Writes the whole table as one array of records.
#[derive(Debug, Clone, Default)]
pub struct JsonArrayWriter {
    /// Whether to pretty-print the output.
    pub pretty: bool,
}

impl JsonArrayWriter {
    /// Create a new JSON array writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty-printing.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl OutputWriter for JsonArrayWriter {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, table: &DisplayTable, output: &mut dyn Write) -> Result<()> {
        let records = table.to_json_array();
        let json_str = if self.pretty {
            serde_json::to_string_pretty(&records)
        } else {
            serde_json::to_string(&records)
        }
        .map_err(|e| ExportError::Output(e.to_string()))?;

        write!(output, "{}", json_str).map_err(|e| ExportError::Output(e.to_string()))?;
        Ok(())
    }
}
