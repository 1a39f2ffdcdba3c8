use anyhow::Result;
use octofhir_export::AttributeMapping;

use crate::output::print_attributes;

pub fn list(mapping: &AttributeMapping) -> Result<()> {
    print_attributes(mapping);
    Ok(())
}
