//! Export configuration.
//!
//! Settings come from an optional TOML file, overridden by environment
//! variables such as `OCTOFHIR_EXPORT__RESHAPE__ANONYMIZATION_SYMBOL=#`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compiler::IDENTIFIER_ATTRIBUTE;
use crate::mapping::DEFAULT_PATIENT_RESOURCE;
use crate::output::OutputFormat;
use crate::reshaper::{AggregationPolicy, DEFAULT_ANONYMIZATION_SYMBOL, ReshapeOptions};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub reshape: ReshapeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.mapping.path.as_os_str().is_empty() {
            return Err("mapping.path must not be empty".into());
        }
        if self.mapping.identifier_attribute.trim().is_empty() {
            return Err("mapping.identifier_attribute must not be empty".into());
        }
        if self.mapping.patient_resource.trim().is_empty() {
            return Err("mapping.patient_resource must not be empty".into());
        }
        if self.reshape.anonymization_symbol.is_empty() {
            return Err("reshape.anonymization_symbol must not be empty".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Reshaping options derived from the `reshape` section.
    pub fn reshape_options(&self) -> ReshapeOptions {
        ReshapeOptions {
            anonymization_symbol: self.reshape.anonymization_symbol.clone(),
            aggregation: self.reshape.aggregation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Attribute mapping document.
    #[serde(default = "default_mapping_path")]
    pub path: PathBuf,
    /// Attribute whose source column identifies a patient.
    #[serde(default = "default_identifier_attribute")]
    pub identifier_attribute: String,
    #[serde(default = "default_patient_resource")]
    pub patient_resource: String,
}

fn default_mapping_path() -> PathBuf {
    PathBuf::from("documents/attributes_mapping.json")
}
fn default_identifier_attribute() -> String {
    IDENTIFIER_ATTRIBUTE.into()
}
fn default_patient_resource() -> String {
    DEFAULT_PATIENT_RESOURCE.into()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            path: default_mapping_path(),
            identifier_attribute: default_identifier_attribute(),
            patient_resource: default_patient_resource(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshapeConfig {
    #[serde(default = "default_anonymization_symbol")]
    pub anonymization_symbol: String,
    #[serde(default)]
    pub aggregation: AggregationPolicy,
}

fn default_anonymization_symbol() -> String {
    DEFAULT_ANONYMIZATION_SYMBOL.into()
}

impl Default for ReshapeConfig {
    fn default() -> Self {
        Self {
            anonymization_symbol: default_anonymization_symbol(),
            aggregation: AggregationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use std::path::PathBuf;

    use config::{Config, Environment, File};

    use super::ExportConfig;
    use crate::error::{ExportError, Result};

    /// Default configuration file, used when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "octofhir-export.toml";

    /// Prefix of environment overrides.
    pub const ENV_PREFIX: &str = "OCTOFHIR_EXPORT";

    pub fn load_config(path: Option<&str>) -> Result<ExportConfig> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(ExportError::Config(config::ConfigError::NotFound(
                        p.to_string(),
                    )));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // e.g. OCTOFHIR_EXPORT__OUTPUT__FORMAT=csv
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let merged: ExportConfig = builder.build()?.try_deserialize()?;
        merged
            .validate()
            .map_err(|e| ExportError::Config(config::ConfigError::Message(e)))?;

        tracing::debug!(
            mapping = %merged.mapping.path.display(),
            format = %merged.output.format,
            "Loaded export configuration"
        );
        Ok(merged)
    }
}
