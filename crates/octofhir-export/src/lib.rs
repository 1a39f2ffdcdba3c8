//! Attribute-driven export of FHIR patient data for OctoFHIR.
//!
//! Callers name the attributes they want ("First name", "Weight", ...). The
//! crate turns that list into a single query over the patient resource and
//! reshapes the query result into one row per patient, one column per
//! requested attribute.
//!
//! # Components
//!
//! - [`AttributeMapping`] - Attribute mapping document, loaded once and shared
//! - [`QueryCompiler`] - Builds the query from requested attributes and a [`Scope`]
//! - [`QueryExecutor`] - Seam to whatever runs the query
//! - [`ResultReshaper`] - Renames, groups by patient and anonymizes results
//! - [`ExportService`] - The whole pipeline
//! - [`output`] - CSV, NDJSON and JSON writers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_export::{AttributeMapping, ExportRequest, ExportService, FileExecutor, ServiceOptions};
//!
//! let mapping = Arc::new(AttributeMapping::from_path("attributes_mapping.json", "Patient")?);
//! let service = ExportService::new(mapping, ServiceOptions::default())?;
//!
//! let request = ExportRequest::parse(r#"{"attributes": [{"official_name": "Weight", "custom_name": "Poids"}]}"#)?;
//! let table = service.export(&request, &FileExecutor::new("result.json"), None).await?;
//! ```

pub mod attribute;
pub mod compiler;
pub mod config;
mod error;
pub mod executor;
pub mod mapping;
pub mod output;
pub mod reshaper;
pub mod service;
pub mod table;

pub use attribute::{ExportRequest, RequestedAttribute, RequestedAttributes, Scope};
pub use compiler::{CompiledQuery, QueryCompiler};
pub use config::ExportConfig;
pub use error::{ErrorCategory, ExportError, Result};
pub use executor::{FileExecutor, QueryExecutor, StaticExecutor};
pub use mapping::{AttributeDefinition, AttributeMapping, Cardinality, MappingOverlay, Shape};
pub use output::{OutputFormat, OutputWriter, get_writer};
pub use reshaper::{AggregationPolicy, ReshapeOptions, ResultReshaper, anonymize};
pub use service::{ExportService, ServiceOptions};
pub use table::{DisplayTable, RawResultTable, Table};
