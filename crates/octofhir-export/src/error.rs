use thiserror::Error;

/// Errors raised while compiling, executing or reshaping an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(
        "Undefined attributes {names:?}, they must be defined in the attribute mapping document"
    )]
    UnknownAttribute { names: Vec<String> },

    #[error("Mapping configuration error: {0}")]
    MappingConfiguration(String),

    #[error("Grouping column '{column}' is not in the table, available columns: {available:?}")]
    GroupingKeyMissing {
        column: String,
        available: Vec<String>,
    },

    #[error("Source column '{column}' of attribute '{attribute}' is not in the result table")]
    MissingSourceColumn { attribute: String, column: String },

    #[error("Invalid attribute mapping: {0}")]
    InvalidMapping(String),

    #[error("Invalid export request: {0}")]
    InvalidRequest(String),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Create an UnknownAttribute error listing every undefined name
    pub fn unknown_attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnknownAttribute {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a MappingConfiguration error
    pub fn mapping_configuration(message: impl Into<String>) -> Self {
        Self::MappingConfiguration(message.into())
    }

    /// Create a GroupingKeyMissing error
    pub fn grouping_key_missing(column: impl Into<String>, available: &[String]) -> Self {
        Self::GroupingKeyMissing {
            column: column.into(),
            available: available.to_vec(),
        }
    }

    /// Create a MissingSourceColumn error
    pub fn missing_source_column(attribute: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingSourceColumn {
            attribute: attribute.into(),
            column: column.into(),
        }
    }

    /// Create an InvalidMapping error
    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        Self::InvalidMapping(message.into())
    }

    /// Create an InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an Execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Check if this error was caused by the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAttribute { .. } | Self::InvalidRequest(_)
        )
    }

    /// Check if this error denotes a deployment or data defect on our side
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownAttribute { .. } | Self::InvalidRequest(_) => ErrorCategory::Validation,
            Self::MappingConfiguration(_) | Self::InvalidMapping(_) | Self::Config(_) => {
                ErrorCategory::Configuration
            }
            Self::GroupingKeyMissing { .. } | Self::MissingSourceColumn { .. } => {
                ErrorCategory::Data
            }
            Self::Execution(_) => ErrorCategory::Execution,
            Self::Output(_) | Self::Json(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
        }
    }
}

/// Error categories for logging and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Configuration,
    Data,
    Execution,
    Serialization,
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
            Self::Data => write!(f, "data"),
            Self::Execution => write!(f, "execution"),
            Self::Serialization => write!(f, "serialization"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Convenience result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;
