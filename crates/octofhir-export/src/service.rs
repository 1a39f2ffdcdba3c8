//! Export pipeline: compile, execute, reshape.

use std::sync::Arc;

use crate::attribute::ExportRequest;
use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::error::{ExportError, Result};
use crate::executor::QueryExecutor;
use crate::mapping::AttributeMapping;
use crate::reshaper::{ReshapeOptions, ResultReshaper};
use crate::table::{DisplayTable, RawResultTable};

/// Options of an [`ExportService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Attribute whose primary column identifies a patient.
    pub identifier_attribute: String,
    pub reshape: ReshapeOptions,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            identifier_attribute: crate::compiler::IDENTIFIER_ATTRIBUTE.to_string(),
            reshape: ReshapeOptions::default(),
        }
    }
}

/// Runs exports against one shared attribute mapping.
///
/// The service is immutable once built and can be shared across tasks;
/// scope restrictions never leak between requests.
#[derive(Debug, Clone)]
pub struct ExportService {
    mapping: Arc<AttributeMapping>,
    compiler: QueryCompiler,
    reshaper: ResultReshaper,
    id_column: String,
}

impl ExportService {
    /// Create a service.
    ///
    /// # Errors
    ///
    /// Returns `MappingConfiguration` when the identifier attribute is not
    /// mapped or selects no column.
    pub fn new(mapping: Arc<AttributeMapping>, options: ServiceOptions) -> Result<Self> {
        let identifier = mapping.require(&options.identifier_attribute)?;
        let id_column = identifier
            .primary_column()
            .ok_or_else(|| {
                ExportError::mapping_configuration(format!(
                    "identifier attribute '{}' selects no column",
                    options.identifier_attribute
                ))
            })?
            .to_string();

        let compiler =
            QueryCompiler::new(mapping.clone()).with_identifier(&options.identifier_attribute);
        let reshaper = ResultReshaper::with_options(mapping.clone(), options.reshape);

        Ok(Self {
            mapping,
            compiler,
            reshaper,
            id_column,
        })
    }

    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    /// Source column carrying the patient identifier.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Validate a request and compile its query.
    pub fn prepare(&self, request: &ExportRequest) -> Result<CompiledQuery> {
        let requested = request.requested()?;
        self.compiler.compile(&requested, &request.scope)
    }

    /// Reshape a raw result into one row per patient.
    pub fn postprocess(&self, raw: &RawResultTable, request: &ExportRequest) -> Result<DisplayTable> {
        let requested = request.requested()?;
        self.reshaper.postprocess(raw, &requested, &self.id_column)
    }

    /// Compile, execute and reshape a request.
    ///
    /// Nothing is executed when the request names an undefined attribute.
    pub async fn export(
        &self,
        request: &ExportRequest,
        executor: &dyn QueryExecutor,
        token: Option<&str>,
    ) -> Result<DisplayTable> {
        let query = self.prepare(request)?;
        let raw = executor.execute(&query, token).await?;
        tracing::debug!(rows = raw.row_count(), columns = raw.column_count(), "Query executed");

        let table = self.postprocess(&raw, request)?;
        tracing::info!(
            patients = table.row_count(),
            attributes = table.column_count(),
            "Export completed"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{RequestedAttribute, Scope};
    use crate::executor::StaticExecutor;
    use crate::mapping::MappingEntry;
    use crate::table::Table;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mapping() -> Arc<AttributeMapping> {
        Arc::new(
            AttributeMapping::from_json_str(include_str!("../documents/attributes_mapping.json"))
                .unwrap(),
        )
    }

    fn service() -> ExportService {
        ExportService::new(mapping(), ServiceOptions::default()).unwrap()
    }

    #[test]
    fn test_identifier_attribute_checked() {
        let options = ServiceOptions {
            identifier_attribute: "Patient id".into(),
            ..Default::default()
        };
        let err = ExportService::new(mapping(), options).unwrap_err();
        assert!(matches!(err, ExportError::MappingConfiguration(_)));

        let options = ServiceOptions {
            identifier_attribute: "Practitioner".into(),
            ..Default::default()
        };
        let err = ExportService::new(mapping(), options).unwrap_err();
        assert!(err.to_string().contains("selects no column"));
    }

    #[test]
    fn test_prepare_includes_identifier() {
        let request = ExportRequest::new(vec![RequestedAttribute::new("First name", "Prénom")]);
        let query = service().prepare(&request).unwrap();
        assert_eq!(
            query.sql,
            "SELECT Patient.name.given, Patient.identifier FROM Patient"
        );
        assert_eq!(query.attributes, vec!["First name", "Identifier"]);
    }

    #[test]
    fn test_scope_attributes_not_in_output() {
        let service = service();
        let request = ExportRequest::new(vec![RequestedAttribute::new("Gender", "Sexe")])
            .with_scope(Scope::new().with_birthdate_condition("ge2001-01-01"));

        let query = service.prepare(&request).unwrap();
        assert!(query.sql.contains("Patient.birthDate"));

        let mut raw = Table::new(["Patient.gender", "Patient.birthDate", "Patient.identifier"]);
        raw.push_row(vec![json!("female"), json!("2003-04-01"), json!("p1")])
            .unwrap();
        let display = service.postprocess(&raw, &request).unwrap();
        assert_eq!(display.columns, vec!["Sexe"]);
        assert_eq!(display.rows, vec![vec![json!("female")]]);
    }

    #[test]
    fn test_concurrent_scopes_do_not_interfere() {
        let service = service();
        let groups = ["g1", "g2", "g3", "g4"];

        std::thread::scope(|s| {
            let handles: Vec<_> = groups
                .iter()
                .map(|group| {
                    let service = &service;
                    s.spawn(move || {
                        let request =
                            ExportRequest::new(vec![RequestedAttribute::named("First name")])
                                .with_scope(
                                    Scope::new()
                                        .with_group(*group)
                                        .with_practitioner(format!("dr-{group}")),
                                );
                        (group, service.prepare(&request).unwrap().sql)
                    })
                })
                .collect();

            for handle in handles {
                let (group, sql) = handle.join().unwrap();
                assert!(sql.ends_with(&format!("Group.identifier = {group}")));
                assert!(sql.contains(&format!("Practitioner.identifier = dr-{group}")));
                assert_eq!(sql.matches("Group.identifier").count(), 1);
            }
        });

        assert!(service.mapping().get("Practitioner").unwrap().filters.is_empty());
    }

    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn execute(
            &self,
            _query: &CompiledQuery,
            _token: Option<&str>,
        ) -> Result<RawResultTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Table::default())
        }
    }

    #[tokio::test]
    async fn test_unknown_attribute_executes_nothing() {
        let executor = CountingExecutor {
            calls: AtomicUsize::new(0),
        };
        let request = ExportRequest::new(vec![RequestedAttribute::named("Height")]);

        let err = service().export(&request, &executor, None).await.unwrap_err();
        assert!(matches!(err, ExportError::UnknownAttribute { ref names } if names == &["Height"]));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_export_end_to_end() {
        let mut raw = Table::new([
            "Patient.name.given",
            "Weight.valueQuantity.value",
            "Weight.valueQuantity.unit",
            "Patient.identifier",
        ]);
        raw.push_row(vec![json!("tom"), json!(50), json!("kg"), json!("p1")])
            .unwrap();
        raw.push_row(vec![json!("tom"), json!(90), json!("kg"), json!("p1")])
            .unwrap();

        let request = ExportRequest::new(vec![
            RequestedAttribute::new("First name", "Prénom"),
            RequestedAttribute::new("Weight", "Poids"),
        ]);
        let display = service()
            .export(&request, &StaticExecutor::new(raw), Some("token"))
            .await
            .unwrap();

        assert_eq!(display.columns, vec!["Prénom", "Poids"]);
        assert_eq!(display.rows, vec![vec![json!("tom"), json!(["50 kg", "90 kg"])]]);
    }

    #[test]
    fn test_custom_identifier_attribute() {
        let mut entries: IndexMap<String, MappingEntry> = serde_json::from_str(include_str!(
            "../documents/attributes_mapping.json"
        ))
        .unwrap();
        let identifier = entries.shift_remove("Identifier").unwrap();
        entries.insert("Patient id".into(), identifier);
        let mapping = Arc::new(AttributeMapping::from_entries(entries, "Patient").unwrap());

        let options = ServiceOptions {
            identifier_attribute: "Patient id".into(),
            ..Default::default()
        };
        let service = ExportService::new(mapping, options).unwrap();
        assert_eq!(service.id_column(), "Patient.identifier");
    }
}
