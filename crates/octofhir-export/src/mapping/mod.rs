//! Attribute mapping document.
//!
//! The mapping document links every human-facing attribute name to the FHIR
//! resource that owns it and the source columns, join conditions and filters
//! used to fetch it:
//!
//! ```json
//! {
//!   "Weight": {
//!     "fhir_resource": "Observation as Weight",
//!     "fhir_source": {
//!       "select": ["Weight.valueQuantity.value", "Weight.valueQuantity.unit"],
//!       "join": [{"key": "Weight.subject", "value": "Patient.id"}],
//!       "where": [{"key": "Weight.code", "value": "http://loinc.org%7C29463-7"}]
//!     },
//!     "display": {
//!       "concatenate_columns": ["Weight.valueQuantity.value", "Weight.valueQuantity.unit"],
//!       "join_symbol": " "
//!     }
//!   }
//! }
//! ```
//!
//! Entries are resolved once at load time into an [`AttributeDefinition`],
//! which carries the display [`Shape`] and the per-patient [`Cardinality`]
//! so later stages never re-inspect the raw document.

mod overlay;

pub use overlay::MappingOverlay;

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// Resource every export is rooted at unless configured otherwise.
pub const DEFAULT_PATIENT_RESOURCE: &str = "Patient";

/// A `{key, value}` equality pair used for joins and filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub value: String,
}

impl Condition {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Render as an equality predicate.
    pub fn to_predicate(&self) -> String {
        format!("{} = {}", self.key, self.value)
    }
}

/// Source section of a mapping entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FhirSource {
    #[serde(default)]
    pub select: Vec<String>,

    #[serde(default)]
    pub join: Vec<Condition>,

    /// Named `where_` because `where` is a Rust keyword.
    #[serde(default, rename = "where")]
    pub where_: Vec<Condition>,
}

/// Display combination rule of a mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRule {
    pub concatenate_columns: Vec<String>,
    pub join_symbol: String,
}

/// One entry of the mapping document as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub fhir_resource: String,

    #[serde(default)]
    pub fhir_source: FhirSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayRule>,
}

/// How an attribute's display value is built from raw columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Copy one raw column.
    Simple { column: String },

    /// Join several raw columns with a separator.
    Concatenated {
        columns: Vec<String>,
        separator: String,
    },

    /// Contributes no columns (pure scope filter).
    Unselected,
}

/// How many values an attribute has per patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Owned by the patient resource itself.
    One,

    /// Owned by a repeated sub-resource (observations, medications...).
    Many,
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One => write!(f, "one"),
            Self::Many => write!(f, "many"),
        }
    }
}

/// A mapping entry resolved for compilation and reshaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub name: String,
    pub resource: String,
    pub select: Vec<String>,
    pub joins: Vec<Condition>,
    pub filters: Vec<Condition>,
    pub shape: Shape,
    pub cardinality: Cardinality,
}

impl AttributeDefinition {
    fn resolve(name: &str, entry: MappingEntry, patient_resource: &str) -> Result<Self> {
        let shape = match entry.display {
            Some(rule) => {
                if rule.concatenate_columns.is_empty() {
                    return Err(ExportError::invalid_mapping(format!(
                        "attribute '{name}' declares a display rule without columns"
                    )));
                }
                Shape::Concatenated {
                    columns: rule.concatenate_columns,
                    separator: rule.join_symbol,
                }
            }
            None => match entry.fhir_source.select.first() {
                Some(column) => Shape::Simple {
                    column: column.clone(),
                },
                None => Shape::Unselected,
            },
        };

        let cardinality = if entry.fhir_resource == patient_resource {
            Cardinality::One
        } else {
            Cardinality::Many
        };

        Ok(Self {
            name: name.to_string(),
            resource: entry.fhir_resource,
            select: entry.fhir_source.select,
            joins: entry.fhir_source.join,
            filters: entry.fhir_source.where_,
            shape,
            cardinality,
        })
    }

    /// Raw column carrying this attribute's value when it is not concatenated.
    pub fn primary_column(&self) -> Option<&str> {
        self.select.first().map(String::as_str)
    }

    /// Short label of the display shape.
    pub fn shape_label(&self) -> &'static str {
        match self.shape {
            Shape::Simple { .. } => "simple",
            Shape::Concatenated { .. } => "concatenated",
            Shape::Unselected => "unselected",
        }
    }
}

/// The loaded attribute mapping, read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    patient_resource: String,
    definitions: IndexMap<String, AttributeDefinition>,
}

impl AttributeMapping {
    /// Resolve raw entries against the patient resource name.
    pub fn from_entries(
        entries: IndexMap<String, MappingEntry>,
        patient_resource: impl Into<String>,
    ) -> Result<Self> {
        let patient_resource = patient_resource.into();
        let mut definitions = IndexMap::with_capacity(entries.len());
        for (name, entry) in entries {
            let definition = AttributeDefinition::resolve(&name, entry, &patient_resource)?;
            definitions.insert(name, definition);
        }
        Ok(Self {
            patient_resource,
            definitions,
        })
    }

    /// Parse a mapping document rooted at the `Patient` resource.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Self::from_json_str_with_root(s, DEFAULT_PATIENT_RESOURCE)
    }

    /// Parse a mapping document rooted at a custom patient resource.
    pub fn from_json_str_with_root(s: &str, patient_resource: &str) -> Result<Self> {
        let entries: IndexMap<String, MappingEntry> =
            serde_json::from_str(s).map_err(|e| ExportError::invalid_mapping(e.to_string()))?;
        Self::from_entries(entries, patient_resource)
    }

    /// Parse a mapping document from a JSON value.
    pub fn from_value(value: serde_json::Value, patient_resource: &str) -> Result<Self> {
        let entries: IndexMap<String, MappingEntry> = serde_json::from_value(value)
            .map_err(|e| ExportError::invalid_mapping(e.to_string()))?;
        Self::from_entries(entries, patient_resource)
    }

    /// Load a mapping document from disk.
    pub fn from_path(path: impl AsRef<Path>, patient_resource: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExportError::mapping_configuration(format!(
                "cannot read attribute mapping {}: {e}",
                path.display()
            ))
        })?;
        let mapping = Self::from_json_str_with_root(&content, patient_resource)?;
        tracing::debug!(
            path = %path.display(),
            attributes = mapping.len(),
            "Loaded attribute mapping"
        );
        Ok(mapping)
    }

    pub fn patient_resource(&self) -> &str {
        &self.patient_resource
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDefinition> {
        self.definitions.get(name)
    }

    /// Look up an attribute the system itself depends on.
    ///
    /// # Errors
    ///
    /// Returns `MappingConfiguration` when the attribute is not mapped.
    pub fn require(&self, name: &str) -> Result<&AttributeDefinition> {
        self.get(name).ok_or_else(|| {
            ExportError::mapping_configuration(format!(
                "attribute '{name}' must be defined in the attribute mapping document"
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Names absent from the mapping, in the order given.
    pub fn undefined<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
