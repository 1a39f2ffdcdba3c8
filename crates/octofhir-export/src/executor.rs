//! Execution of compiled queries.
//!
//! Running the query belongs to an external service; the pipeline only sees
//! the [`QueryExecutor`] seam. [`FileExecutor`] replays a result recorded on
//! disk, which is what the CLI and tests use.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::compiler::CompiledQuery;
use crate::error::{ExportError, Result};
use crate::table::{RawResultTable, Table};

/// Runs a compiled query and returns its tabular result.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute `query` on behalf of the holder of `token`.
    async fn execute(
        &self,
        query: &CompiledQuery,
        token: Option<&str>,
    ) -> Result<RawResultTable>;
}

/// Returns a result stored as JSON, ignoring the query text.
///
/// The file holds either an array of records or a `{columns, rows}` object.
/// Records are read over the query's columns, so fields a record omits and
/// an empty array both come back as nulls rather than missing columns.
#[derive(Debug, Clone)]
pub struct FileExecutor {
    path: PathBuf,
}

impl FileExecutor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl QueryExecutor for FileExecutor {
    async fn execute(
        &self,
        query: &CompiledQuery,
        _token: Option<&str>,
    ) -> Result<RawResultTable> {
        tracing::debug!(path = %self.path.display(), sql = %query.sql, "Replaying recorded result");

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ExportError::execution(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        Table::from_json_with_columns(&query.columns, &value)
    }
}

/// Returns the same in-memory table for every query.
#[derive(Debug, Clone)]
pub struct StaticExecutor {
    table: RawResultTable,
}

impl StaticExecutor {
    pub fn new(table: RawResultTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl QueryExecutor for StaticExecutor {
    async fn execute(
        &self,
        _query: &CompiledQuery,
        _token: Option<&str>,
    ) -> Result<RawResultTable> {
        Ok(self.table.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn query(sql: &str, columns: &[&str]) -> CompiledQuery {
        CompiledQuery {
            sql: sql.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_file_executor_reads_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([
                {"Patient.identifier": "p1", "Patient.gender": "female"},
                {"Patient.identifier": "p2", "Patient.gender": "male"}
            ])
        )
        .unwrap();

        let executor = FileExecutor::new(file.path());
        let query = query("SELECT Patient.gender FROM Patient", &["Patient.gender"]);
        let table = tokio_test::block_on(executor.execute(&query, None)).unwrap();
        assert_eq!(table.columns, vec!["Patient.gender", "Patient.identifier"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_file_executor_keeps_record_key_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"b": 1, "a": 2}}, {{"c": 3}}]"#).unwrap();

        let executor = FileExecutor::new(file.path());
        let table = tokio_test::block_on(executor.execute(&query("SELECT *", &[]), None)).unwrap();
        assert_eq!(table.columns, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_file_executor_empty_result_has_query_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();

        let executor = FileExecutor::new(file.path());
        let query = query(
            "SELECT Patient.name.given, Patient.identifier FROM Patient",
            &["Patient.name.given", "Patient.identifier"],
        );
        let table = tokio_test::block_on(executor.execute(&query, None)).unwrap();
        assert_eq!(table.columns, vec!["Patient.name.given", "Patient.identifier"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_file_executor_missing_file() {
        let executor = FileExecutor::new("/nonexistent/result.json");
        let err = tokio_test::block_on(executor.execute(&query("SELECT * FROM Patient", &[]), None))
            .unwrap_err();
        assert!(matches!(err, ExportError::Execution(_)));
    }

    #[test]
    fn test_static_executor() {
        let table = Table::new(["Patient.identifier"]);
        let executor = StaticExecutor::new(table.clone());
        let result =
            tokio_test::block_on(executor.execute(&query("SELECT 1", &[]), Some("token"))).unwrap();
        assert_eq!(result, table);
    }
}
