//! Request-scoped view over the shared attribute mapping.
//!
//! Scope restrictions add filters to mapping entries for the duration of a
//! single compilation. They are recorded here, in front of the shared
//! [`AttributeMapping`], which is never modified.

use indexmap::IndexMap;

use super::{AttributeDefinition, AttributeMapping, Condition};
use crate::error::Result;

/// Copy-on-write view: injected filters first, base mapping underneath.
#[derive(Debug)]
pub struct MappingOverlay<'a> {
    base: &'a AttributeMapping,
    injected_filters: IndexMap<String, Vec<Condition>>,
}

impl<'a> MappingOverlay<'a> {
    pub fn new(base: &'a AttributeMapping) -> Self {
        Self {
            base,
            injected_filters: IndexMap::new(),
        }
    }

    pub fn base(&self) -> &'a AttributeMapping {
        self.base
    }

    /// Add a filter to an attribute for this view only.
    ///
    /// # Errors
    ///
    /// Returns `MappingConfiguration` when the attribute is not mapped.
    pub fn inject_filter(&mut self, attribute: &str, condition: Condition) -> Result<()> {
        self.base.require(attribute)?;
        self.injected_filters
            .entry(attribute.to_string())
            .or_default()
            .push(condition);
        Ok(())
    }

    pub fn get(&self, attribute: &str) -> Option<&'a AttributeDefinition> {
        self.base.get(attribute)
    }

    /// Declared filters followed by the injected ones.
    pub fn filters(&self, attribute: &str) -> impl Iterator<Item = &Condition> {
        let declared = self
            .base
            .get(attribute)
            .map(|d| d.filters.as_slice())
            .unwrap_or_default();
        let injected = self
            .injected_filters
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or_default();
        declared.iter().chain(injected.iter())
    }

    pub fn has_injections(&self) -> bool {
        !self.injected_filters.is_empty()
    }
}
