//! Query compilation from requested attributes.
//!
//! The compiler turns a set of requested attributes and an optional scope
//! into one flat `SELECT ... FROM Patient [INNER JOIN ...] [WHERE ...]`
//! query. Every clause is driven by the attribute mapping; scope filters are
//! injected through a [`MappingOverlay`] so the shared mapping stays
//! untouched.

use std::sync::Arc;

use crate::attribute::{RequestedAttributes, Scope};
use crate::error::{ExportError, Result};
use crate::mapping::{AttributeMapping, Condition, MappingOverlay};

/// Attribute injected for a practitioner scope.
pub const PRACTITIONER_ATTRIBUTE: &str = "Practitioner";

/// Attribute injected for a birthdate scope.
pub const BIRTHDATE_ATTRIBUTE: &str = "Birthdate";

/// Attribute carrying the patient identifier.
pub const IDENTIFIER_ATTRIBUTE: &str = "Identifier";

const PRACTITIONER_IDENTITY_KEY: &str = "Practitioner.identifier";
const PATIENT_BIRTHDATE_KEY: &str = "Patient.birthdate";
const GROUP_RESOURCE: &str = "Group";
const GROUP_IDENTITY_KEY: &str = "Group.identifier";
const GROUP_MEMBER_KEY: &str = "Group.member";

/// Result of compiling a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// The query string.
    pub sql: String,

    /// Source columns in SELECT order.
    pub columns: Vec<String>,

    /// Attributes the query was built from, requested ones first, then
    /// the ones injected for the scope and the identifier.
    pub attributes: Vec<String>,
}

/// Compiles requested attributes into a query string.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    mapping: Arc<AttributeMapping>,
    identifier_attribute: Option<String>,
}

impl QueryCompiler {
    /// Create a compiler that queries exactly the attributes it is given.
    pub fn new(mapping: Arc<AttributeMapping>) -> Self {
        Self {
            mapping,
            identifier_attribute: None,
        }
    }

    /// Always include the given identifier attribute in compiled queries.
    pub fn with_identifier(mut self, attribute: impl Into<String>) -> Self {
        self.identifier_attribute = Some(attribute.into());
        self
    }

    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    /// Check every requested attribute is defined in the mapping.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` listing all undefined names.
    pub fn validate(&self, attributes: &RequestedAttributes) -> Result<()> {
        let undefined = self.mapping.undefined(attributes.names());
        if undefined.is_empty() {
            Ok(())
        } else {
            Err(ExportError::unknown_attributes(undefined))
        }
    }

    /// Compile requested attributes and scope into a query.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` before building anything if a requested
    /// attribute is undefined, and `MappingConfiguration` if an attribute the
    /// scope relies on is missing from the mapping.
    pub fn compile(&self, attributes: &RequestedAttributes, scope: &Scope) -> Result<CompiledQuery> {
        self.validate(attributes)?;

        let mut overlay = MappingOverlay::new(&self.mapping);
        let mut working: Vec<String> = attributes.names().map(str::to_string).collect();

        if let Some(practitioner_id) = &scope.practitioner_id {
            overlay.inject_filter(
                PRACTITIONER_ATTRIBUTE,
                Condition::new(PRACTITIONER_IDENTITY_KEY, practitioner_id.as_str()),
            )?;
            push_unique(&mut working, PRACTITIONER_ATTRIBUTE);
        }

        if let Some(condition) = &scope.birthdate_condition {
            overlay.inject_filter(
                BIRTHDATE_ATTRIBUTE,
                Condition::new(PATIENT_BIRTHDATE_KEY, condition.as_str()),
            )?;
            push_unique(&mut working, BIRTHDATE_ATTRIBUTE);
        }

        if let Some(identifier) = &self.identifier_attribute {
            self.mapping.require(identifier)?;
            push_unique(&mut working, identifier);
        }

        let columns = select_columns(&overlay, &working);
        let mut clauses = vec![select_clause(&columns, self.mapping.patient_resource())];

        let mut joins = join_clauses(&overlay, &working);
        let mut predicates = where_predicates(&overlay, &working);

        if let Some(group_id) = &scope.group_id {
            let patient_id = format!("{}.id", self.mapping.patient_resource());
            joins.push(format!(
                "INNER JOIN {GROUP_RESOURCE} ON {GROUP_MEMBER_KEY} = {patient_id}"
            ));
            predicates.push(Condition::new(GROUP_IDENTITY_KEY, group_id.as_str()).to_predicate());
        }

        if !joins.is_empty() {
            clauses.push(joins.join(" "));
        }
        if !predicates.is_empty() {
            clauses.push(format!("WHERE {}", predicates.join(" AND ")));
        }

        let sql = clauses.join(" ");
        tracing::debug!(sql = %sql, attributes = working.len(), "Compiled export query");

        Ok(CompiledQuery {
            sql,
            columns,
            attributes: working,
        })
    }
}

fn push_unique(working: &mut Vec<String>, attribute: &str) {
    if !working.iter().any(|name| name == attribute) {
        working.push(attribute.to_string());
    }
}

fn select_columns(overlay: &MappingOverlay<'_>, working: &[String]) -> Vec<String> {
    working
        .iter()
        .filter_map(|name| overlay.get(name))
        .flat_map(|definition| definition.select.iter().cloned())
        .collect()
}

fn select_clause(columns: &[String], patient_resource: &str) -> String {
    let list = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };
    format!("SELECT {list} FROM {patient_resource}")
}

fn join_clauses(overlay: &MappingOverlay<'_>, working: &[String]) -> Vec<String> {
    let mut joins = Vec::new();
    for definition in working.iter().filter_map(|name| overlay.get(name)) {
        for condition in &definition.joins {
            joins.push(format!(
                "INNER JOIN {} ON {}",
                definition.resource,
                condition.to_predicate()
            ));
        }
    }
    joins
}

fn where_predicates(overlay: &MappingOverlay<'_>, working: &[String]) -> Vec<String> {
    working
        .iter()
        .flat_map(|name| overlay.filters(name).map(Condition::to_predicate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::RequestedAttribute;

    fn mapping() -> Arc<AttributeMapping> {
        Arc::new(
            AttributeMapping::from_json_str(include_str!("../documents/attributes_mapping.json"))
                .unwrap(),
        )
    }

    fn request(names: &[(&str, &str)]) -> RequestedAttributes {
        names
            .iter()
            .map(|(official, custom)| RequestedAttribute::new(*official, *custom))
            .collect()
    }

    fn lab_request() -> RequestedAttributes {
        request(&[
            ("First name", "Prénom"),
            ("Gender", "Sexe"),
            ("ASAT", "ASAT"),
            ("Potassium", "Potassium"),
        ])
    }

    #[test]
    fn test_simple_query() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(&request(&[("First name", "Prénom")]), &Scope::default())
            .unwrap();
        assert_eq!(query.sql, "SELECT Patient.name.given FROM Patient");
        assert_eq!(query.columns, vec!["Patient.name.given"]);
    }

    #[test]
    fn test_complex_query() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler.compile(&lab_request(), &Scope::default()).unwrap();

        let expected = "SELECT Patient.name.given, Patient.gender, \
            ASAT.valueQuantity.value, ASAT.valueQuantity.unit, \
            Potassium.valueQuantity.value, Potassium.valueQuantity.unit \
            FROM Patient \
            INNER JOIN Observation as ASAT ON ASAT.subject = Patient.id \
            INNER JOIN Observation as Potassium ON Potassium.subject = Patient.id \
            WHERE ASAT.code = http://loinc.org%7C1920-8 AND Potassium.code = http://loinc.org%7C2823-3";
        assert_eq!(query.sql, expected);
    }

    #[test]
    fn test_group_scope() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(&lab_request(), &Scope::new().with_group("38de92"))
            .unwrap();

        assert!(query.sql.contains("INNER JOIN Group ON Group.member = Patient.id"));
        assert!(query.sql.ends_with("AND Group.identifier = 38de92"));
        assert!(!query.attributes.iter().any(|a| a == "Group"));
    }

    #[test]
    fn test_group_scope_without_other_filters() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(&request(&[("Gender", "Sexe")]), &Scope::new().with_group("g1"))
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT Patient.gender FROM Patient INNER JOIN Group ON Group.member = Patient.id \
             WHERE Group.identifier = g1"
        );
    }

    #[test]
    fn test_birthdate_scope_injects_attribute() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(
                &request(&[("First name", "Prénom")]),
                &Scope::new().with_birthdate_condition("ge2001-01-01"),
            )
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT Patient.name.given, Patient.birthDate FROM Patient \
             WHERE Patient.birthdate = ge2001-01-01"
        );
        assert_eq!(query.attributes, vec!["First name", "Birthdate"]);
    }

    #[test]
    fn test_birthdate_scope_does_not_duplicate_requested_attribute() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(
                &request(&[("Birthdate", "Anniversaire")]),
                &Scope::new().with_birthdate_condition("le1990-12-31"),
            )
            .unwrap();
        assert_eq!(query.attributes, vec!["Birthdate"]);
        assert_eq!(query.columns, vec!["Patient.birthDate"]);
    }

    #[test]
    fn test_practitioner_scope() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(
                &request(&[("Weight", "Poids")]),
                &Scope::new().with_practitioner("pr-7"),
            )
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT Weight.valueQuantity.value, Weight.valueQuantity.unit FROM Patient \
             INNER JOIN Observation as Weight ON Weight.subject = Patient.id \
             INNER JOIN Practitioner ON Practitioner.id = Patient.general-practitioner \
             WHERE Weight.code = http://loinc.org%7C29463-7 AND Practitioner.identifier = pr-7"
        );
    }

    #[test]
    fn test_identifier_forced_when_configured() {
        let compiler = QueryCompiler::new(mapping()).with_identifier(IDENTIFIER_ATTRIBUTE);
        let query = compiler
            .compile(&request(&[("First name", "Prénom")]), &Scope::default())
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT Patient.name.given, Patient.identifier FROM Patient"
        );

        let query = compiler
            .compile(
                &request(&[("Identifier", "ID"), ("First name", "Prénom")]),
                &Scope::default(),
            )
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT Patient.identifier, Patient.name.given FROM Patient"
        );
    }

    #[test]
    fn test_unknown_attributes_all_reported() {
        let compiler = QueryCompiler::new(mapping());
        let err = compiler
            .compile(
                &request(&[("Height", "Taille"), ("Weight", "Poids"), ("Pulse", "Pouls")]),
                &Scope::default(),
            )
            .unwrap_err();
        match err {
            ExportError::UnknownAttribute { names } => {
                assert_eq!(names, vec!["Height", "Pulse"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_scope_attribute_is_configuration_error() {
        let mapping = Arc::new(
            AttributeMapping::from_json_str(
                r#"{"First name": {"fhir_resource": "Patient", "fhir_source": {"select": ["Patient.name.given"]}}}"#,
            )
            .unwrap(),
        );
        let compiler = QueryCompiler::new(mapping);
        let err = compiler
            .compile(
                &request(&[("First name", "Prénom")]),
                &Scope::new().with_birthdate_condition("ge2001-01-01"),
            )
            .unwrap_err();
        assert!(matches!(err, ExportError::MappingConfiguration(_)));

        let err = compiler
            .clone()
            .with_identifier(IDENTIFIER_ATTRIBUTE)
            .compile(&request(&[("First name", "Prénom")]), &Scope::default())
            .unwrap_err();
        assert!(matches!(err, ExportError::MappingConfiguration(_)));
    }

    #[test]
    fn test_unselected_only_query() {
        let compiler = QueryCompiler::new(mapping());
        let query = compiler
            .compile(&request(&[("Practitioner", "Médecin")]), &Scope::default())
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM Patient INNER JOIN Practitioner ON Practitioner.id = Patient.general-practitioner"
        );
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let compiler = QueryCompiler::new(mapping()).with_identifier(IDENTIFIER_ATTRIBUTE);
        let scope = Scope::new()
            .with_practitioner("pr-1")
            .with_group("g-2")
            .with_birthdate_condition("ge2001-01-01");
        let first = compiler.compile(&lab_request(), &scope).unwrap();
        let second = compiler.compile(&lab_request(), &scope).unwrap();
        assert_eq!(first, second);
        assert!(!first.sql.contains("  "));
    }
}
