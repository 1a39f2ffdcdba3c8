//! Tabular values flowing through the export pipeline.
//!
//! The same [`Table`] type carries the raw query result (columns are source
//! identifiers such as `Patient.name.given`), the intermediate renamed table
//! and the final display table (columns are the caller's custom names).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExportError, Result};

/// Rows returned by query execution.
pub type RawResultTable = Table;

/// One row per patient, one column per requested attribute.
pub type DisplayTable = Table;

/// Column names plus row-major JSON cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from JSON records.
    ///
    /// Columns appear in the order they are first seen; absent fields are null.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        Self::from_records_with_columns(&[], records)
    }

    /// Build a table from JSON records over a known schema.
    ///
    /// `columns` come first, even when no record carries them, followed by
    /// any other field in first-seen order. Absent fields are null, so an
    /// empty record list yields an empty table with the full schema.
    pub fn from_records_with_columns(columns: &[String], records: &[Value]) -> Result<Self> {
        let mut columns = columns.to_vec();
        for record in records {
            let object = record.as_object().ok_or_else(|| {
                ExportError::execution(format!("expected a JSON object record, got {record}"))
            })?;
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .filter_map(Value::as_object)
            .map(|object| {
                columns
                    .iter()
                    .map(|c| object.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Parse either a JSON array of records or a `{columns, rows}` object.
    pub fn from_json(value: &Value) -> Result<Self> {
        Self::from_json_with_columns(&[], value)
    }

    /// Like [`Table::from_json`], seeding record arrays with `columns`.
    ///
    /// A `{columns, rows}` object states its own schema and is taken as is.
    pub fn from_json_with_columns(columns: &[String], value: &Value) -> Result<Self> {
        match value {
            Value::Array(records) => Self::from_records_with_columns(columns, records),
            Value::Object(_) => {
                let table: Table = serde_json::from_value(value.clone())?;
                table.check_shape()?;
                Ok(table)
            }
            other => Err(ExportError::execution(format!(
                "expected records or a table object, got {other}"
            ))),
        }
    }

    fn check_shape(&self) -> Result<()> {
        match self.rows.iter().position(|row| row.len() != self.columns.len()) {
            Some(index) => Err(ExportError::execution(format!(
                "row {index} has {} cells, expected {}",
                self.rows[index].len(),
                self.columns.len()
            ))),
            None => Ok(()),
        }
    }

    /// Append a row; it must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ExportError::execution(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Get column values by name.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }

    /// Get a single cell.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Remove a column, returning whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(index);
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
        true
    }

    /// Get a single row by index as a JSON object.
    pub fn row_as_object(&self, index: usize) -> Option<Value> {
        self.rows.get(index).map(|row| self.object_from_row(row))
    }

    /// Convert the table to a JSON array of objects.
    pub fn to_json_array(&self) -> Vec<Value> {
        self.rows.iter().map(|row| self.object_from_row(row)).collect()
    }

    fn object_from_row(&self, row: &[Value]) -> Value {
        let mut obj = Map::new();
        for (column, value) in self.columns.iter().zip(row.iter()) {
            obj.insert(column.clone(), value.clone());
        }
        Value::Object(obj)
    }
}
