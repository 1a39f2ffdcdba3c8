//! Reshaping of raw query results into the display table.
//!
//! A raw result has one row per matched leaf resource: a patient with three
//! medication requests appears three times. Reshaping renames source columns
//! to the caller's labels, concatenates multi-column values, groups rows by
//! patient and masks anonymized columns:
//!
//! ```text
//! | Patient.identifier | Weight.valueQuantity.value | Weight.valueQuantity.unit |
//! | 8392               | 50                         | kg                        |
//! | 8392               | 90                         | kg                        |
//!
//! | Poids            |
//! | [50 kg, 90 kg]   |
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attribute::RequestedAttributes;
use crate::error::{ExportError, Result};
use crate::mapping::{AttributeMapping, Cardinality, Shape};
use crate::table::{DisplayTable, RawResultTable, Table};

/// Default symbol written over anonymized cells.
pub const DEFAULT_ANONYMIZATION_SYMBOL: &str = "*";

/// How repeated values of a multi-valued attribute are collected per patient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    /// Keep every non-null value in row order, duplicates included.
    #[default]
    List,

    /// Keep the first occurrence of each distinct value.
    Distinct,
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Distinct => write!(f, "distinct"),
        }
    }
}

/// Reshaping settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapeOptions {
    pub anonymization_symbol: String,
    pub aggregation: AggregationPolicy,
}

impl Default for ReshapeOptions {
    fn default() -> Self {
        Self {
            anonymization_symbol: DEFAULT_ANONYMIZATION_SYMBOL.to_string(),
            aggregation: AggregationPolicy::default(),
        }
    }
}

/// Where the value of one output column comes from in a raw row.
enum ColumnSource<'a> {
    Single(usize),
    Joined {
        indices: Vec<usize>,
        separator: &'a str,
    },
    Empty,
}

/// Per-group accumulator of one column.
enum Slot {
    Single(Value),
    Many(Vec<Value>),
}

/// Turns raw query results into display tables.
#[derive(Debug, Clone)]
pub struct ResultReshaper {
    mapping: Arc<AttributeMapping>,
    options: ReshapeOptions,
}

impl ResultReshaper {
    pub fn new(mapping: Arc<AttributeMapping>) -> Self {
        Self::with_options(mapping, ReshapeOptions::default())
    }

    pub fn with_options(mapping: Arc<AttributeMapping>, options: ReshapeOptions) -> Self {
        Self { mapping, options }
    }

    pub fn options(&self) -> &ReshapeOptions {
        &self.options
    }

    /// Rename source columns to custom names and build concatenated values.
    ///
    /// The patient identifier column is carried through first under its raw
    /// name, flattened to a scalar; rows without an identifier are dropped.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for an unmapped attribute and
    /// `MissingSourceColumn` when a declared source column is absent.
    pub fn rename_and_concatenate(
        &self,
        raw: &RawResultTable,
        requested: &RequestedAttributes,
        patient_id_column: &str,
    ) -> Result<Table> {
        let undefined = self.mapping.undefined(requested.names());
        if !undefined.is_empty() {
            return Err(ExportError::unknown_attributes(undefined));
        }
        if requested.iter().any(|a| a.custom_name == patient_id_column) {
            return Err(ExportError::invalid_request(format!(
                "column name '{patient_id_column}' is reserved for the patient identifier"
            )));
        }

        let id_index = raw.column_index(patient_id_column);
        let mut columns = Vec::with_capacity(requested.len() + 1);
        if id_index.is_some() {
            columns.push(patient_id_column.to_string());
        }

        let mut sources = Vec::with_capacity(requested.len());
        for attribute in requested {
            let definition = self.mapping.require(&attribute.official_name)?;
            let locate = |column: &str| {
                raw.column_index(column).ok_or_else(|| {
                    ExportError::missing_source_column(&attribute.official_name, column)
                })
            };
            let source = match &definition.shape {
                Shape::Simple { column } => ColumnSource::Single(locate(column.as_str())?),
                Shape::Concatenated { columns, separator } => ColumnSource::Joined {
                    indices: columns
                        .iter()
                        .map(|c| locate(c.as_str()))
                        .collect::<Result<Vec<_>>>()?,
                    separator: separator.as_str(),
                },
                Shape::Unselected => ColumnSource::Empty,
            };
            sources.push(source);
            columns.push(attribute.custom_name.clone());
        }

        let mut rows = Vec::with_capacity(raw.row_count());
        let mut dropped = 0usize;
        for raw_row in &raw.rows {
            let mut row = Vec::with_capacity(columns.len());
            if let Some(index) = id_index {
                let identifier = flatten_scalar(cell(raw_row, index));
                if identifier.is_null() {
                    dropped += 1;
                    continue;
                }
                row.push(identifier);
            }
            for source in &sources {
                row.push(match source {
                    ColumnSource::Single(index) => flatten_scalar(cell(raw_row, *index)),
                    ColumnSource::Joined { indices, separator } => {
                        Value::String(concatenate(raw_row, indices, separator))
                    }
                    ColumnSource::Empty => Value::Null,
                });
            }
            rows.push(row);
        }

        if dropped > 0 {
            tracing::warn!(
                dropped,
                column = patient_id_column,
                "Dropped rows without patient identifier"
            );
        }
        tracing::debug!(rows = rows.len(), columns = columns.len(), "Renamed result columns");

        Ok(Table { columns, rows })
    }

    /// Custom names of requested attributes owned by the patient resource.
    pub fn patient_columns(&self, requested: &RequestedAttributes) -> Vec<String> {
        requested
            .iter()
            .filter(|a| {
                self.mapping
                    .get(&a.official_name)
                    .is_some_and(|d| d.cardinality == Cardinality::One)
            })
            .map(|a| a.custom_name.clone())
            .collect()
    }

    /// Collapse rows into one row per patient.
    ///
    /// `key_column` and `patient_columns` keep a single value per patient
    /// (the first non-null one seen); every other column becomes an array
    /// of its non-null values following the aggregation policy. Rows are
    /// ordered by identifier: strings by their text, then any other JSON
    /// value by its serialized form. `"1"` and `1` are distinct patients.
    ///
    /// # Errors
    ///
    /// Returns `GroupingKeyMissing` when a grouping column is not in the table.
    pub fn aggregate_by_patient(
        &self,
        table: &Table,
        key_column: &str,
        patient_columns: &[String],
    ) -> Result<Table> {
        let key_index = table
            .column_index(key_column)
            .ok_or_else(|| ExportError::grouping_key_missing(key_column, &table.columns))?;

        let mut single: HashSet<usize> = HashSet::with_capacity(patient_columns.len() + 1);
        single.insert(key_index);
        for column in patient_columns {
            let index = table
                .column_index(column)
                .ok_or_else(|| ExportError::grouping_key_missing(column, &table.columns))?;
            single.insert(index);
        }

        let mut groups: BTreeMap<GroupKey, Vec<Slot>> = BTreeMap::new();
        for row in &table.rows {
            let key = cell(row, key_index);
            if key.is_null() {
                continue;
            }
            let slots = groups.entry(GroupKey::of(key)).or_insert_with(|| {
                (0..table.column_count())
                    .map(|index| {
                        if single.contains(&index) {
                            Slot::Single(Value::Null)
                        } else {
                            Slot::Many(Vec::new())
                        }
                    })
                    .collect()
            });

            for (slot, value) in slots.iter_mut().zip(row.iter()) {
                match slot {
                    Slot::Single(current) => {
                        if current.is_null() {
                            *current = value.clone();
                        }
                    }
                    Slot::Many(values) => {
                        if value.is_null() {
                            continue;
                        }
                        if self.options.aggregation == AggregationPolicy::Distinct
                            && values.contains(value)
                        {
                            continue;
                        }
                        values.push(value.clone());
                    }
                }
            }
        }

        let rows: Vec<Vec<Value>> = groups
            .into_values()
            .map(|slots| {
                slots
                    .into_iter()
                    .map(|slot| match slot {
                        Slot::Single(value) => value,
                        Slot::Many(values) => Value::Array(values),
                    })
                    .collect()
            })
            .collect();

        tracing::debug!(patients = rows.len(), "Grouped rows by patient");

        Ok(Table {
            columns: table.columns.clone(),
            rows,
        })
    }

    /// Mask anonymized columns with the configured symbol.
    pub fn anonymize(&self, table: Table, requested: &RequestedAttributes) -> Table {
        anonymize(table, requested, &self.options.anonymization_symbol)
    }

    /// Full reshaping: rename, group by patient, anonymize, drop the key.
    ///
    /// The output has exactly one column per requested attribute, in request
    /// order, and one row per distinct non-null patient identifier.
    pub fn postprocess(
        &self,
        raw: &RawResultTable,
        requested: &RequestedAttributes,
        patient_id_column: &str,
    ) -> Result<DisplayTable> {
        let renamed = self.rename_and_concatenate(raw, requested, patient_id_column)?;
        let patient_columns = self.patient_columns(requested);
        let grouped = self.aggregate_by_patient(&renamed, patient_id_column, &patient_columns)?;
        let mut display = self.anonymize(grouped, requested);
        display.drop_column(patient_id_column);
        Ok(display)
    }
}

/// Overwrite every anonymized column with `symbol`.
///
/// Applies whatever the column held, collections included; applying it
/// twice leaves the table unchanged.
pub fn anonymize(mut table: Table, requested: &RequestedAttributes, symbol: &str) -> Table {
    let masked: Vec<usize> = requested
        .iter()
        .filter(|a| a.anonymize)
        .filter_map(|a| table.column_index(&a.custom_name))
        .collect();

    for row in &mut table.rows {
        for &index in &masked {
            if let Some(value) = row.get_mut(index) {
                *value = Value::String(symbol.to_string());
            }
        }
    }
    table
}

fn cell(row: &[Value], index: usize) -> &Value {
    row.get(index).unwrap_or(&Value::Null)
}

/// Reduce sequence-wrapped values to their first leaf.
fn flatten_scalar(value: &Value) -> Value {
    let mut current = value;
    while let Value::Array(items) = current {
        match items.first() {
            Some(first) => current = first,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Text of a cell for display, `None` when absent or empty.
fn display_text(value: &Value) -> Option<String> {
    match flatten_scalar(value) {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn concatenate(row: &[Value], indices: &[usize], separator: &str) -> String {
    indices
        .iter()
        .filter_map(|&index| display_text(cell(row, index)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Typed identity of a patient identifier.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
    Text(String),
    Json(String),
}

impl GroupKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Json(other.to_string()),
        }
    }
}
