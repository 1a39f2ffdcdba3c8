//! Caller-facing request types.
//!
//! An export request names the attributes to extract (by their official
//! mapping name), the label each one gets in the output table, whether it is
//! masked, and an optional scope narrowing the patient population.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// One attribute asked for by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAttribute {
    /// Key into the attribute mapping document.
    pub official_name: String,

    /// Column label in the display table.
    pub custom_name: String,

    /// Whether the output column is masked.
    #[serde(default)]
    pub anonymize: bool,
}

impl RequestedAttribute {
    /// Request an attribute under a custom column label.
    pub fn new(official_name: impl Into<String>, custom_name: impl Into<String>) -> Self {
        Self {
            official_name: official_name.into(),
            custom_name: custom_name.into(),
            anonymize: false,
        }
    }

    /// Request an attribute labelled with its own official name.
    pub fn named(official_name: impl Into<String>) -> Self {
        let official_name = official_name.into();
        Self {
            custom_name: official_name.clone(),
            official_name,
            anonymize: false,
        }
    }

    /// Set whether the output column is masked.
    pub fn with_anonymize(mut self, anonymize: bool) -> Self {
        self.anonymize = anonymize;
        self
    }
}

/// Requested attributes keyed by official name, in caller order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedAttributes {
    entries: IndexMap<String, RequestedAttribute>,
}

impl RequestedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the collection, rejecting duplicate official or custom names.
    pub fn try_from_vec(attributes: Vec<RequestedAttribute>) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(attributes.len());
        let mut labels = HashSet::with_capacity(attributes.len());
        for attribute in attributes {
            if !labels.insert(attribute.custom_name.clone()) {
                return Err(ExportError::invalid_request(format!(
                    "column name '{}' is requested more than once",
                    attribute.custom_name
                )));
            }
            if entries.contains_key(&attribute.official_name) {
                return Err(ExportError::invalid_request(format!(
                    "attribute '{}' is requested more than once",
                    attribute.official_name
                )));
            }
            entries.insert(attribute.official_name.clone(), attribute);
        }
        Ok(Self { entries })
    }

    /// Insert or replace an attribute, keeping its original position on replace.
    pub fn insert(&mut self, attribute: RequestedAttribute) {
        self.entries.insert(attribute.official_name.clone(), attribute);
    }

    pub fn get(&self, official_name: &str) -> Option<&RequestedAttribute> {
        self.entries.get(official_name)
    }

    pub fn contains(&self, official_name: &str) -> bool {
        self.entries.contains_key(official_name)
    }

    /// Official names in caller order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestedAttribute> {
        self.entries.values()
    }

    /// Output column labels in caller order.
    pub fn custom_names(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|a| a.custom_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RequestedAttribute> for RequestedAttributes {
    /// Later duplicates of an official name replace earlier ones.
    fn from_iter<T: IntoIterator<Item = RequestedAttribute>>(iter: T) -> Self {
        let mut attributes = Self::new();
        for attribute in iter {
            attributes.insert(attribute);
        }
        attributes
    }
}

impl<'a> IntoIterator for &'a RequestedAttributes {
    type Item = &'a RequestedAttribute;
    type IntoIter = indexmap::map::Values<'a, String, RequestedAttribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Restriction of the patient population an export covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Opaque comparison such as `ge2001-01-01`, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate_condition: Option<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_practitioner(mut self, practitioner_id: impl Into<String>) -> Self {
        self.practitioner_id = Some(practitioner_id.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_birthdate_condition(mut self, condition: impl Into<String>) -> Self {
        self.birthdate_condition = Some(condition.into());
        self
    }

    /// True when no restriction is set.
    pub fn is_unrestricted(&self) -> bool {
        self.practitioner_id.is_none() && self.group_id.is_none() && self.birthdate_condition.is_none()
    }
}

/// Body of an export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub attributes: Vec<RequestedAttribute>,

    #[serde(flatten)]
    pub scope: Scope,
}

impl ExportRequest {
    pub fn new(attributes: Vec<RequestedAttribute>) -> Self {
        Self {
            attributes,
            scope: Scope::default(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Parse a request from its JSON body.
    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| ExportError::invalid_request(e.to_string()))
    }

    /// Requested attributes as a keyed collection.
    pub fn requested(&self) -> Result<RequestedAttributes> {
        RequestedAttributes::try_from_vec(self.attributes.clone())
    }
}
