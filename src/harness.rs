//! Conformance harness.
//!
//! Builds the fixture on a live connection and checks that every dialect
//! answers the same questions the same way.

use crate::db::Connection;
use crate::error::DbError;
use crate::fixture::{self, FIXTURE_TABLES, SeedIds};
use crate::models::{ConnectionState, Filter, SelectTopResult, SortSpec};
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum HarnessError {
    /// Fixture creation or seeding failed; nothing is rolled back.
    #[error("Fixture setup failed: {0}")]
    Setup(#[source] DbError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Check '{check}' failed: expected {expected}, got {actual}")]
    Mismatch {
        check: String,
        expected: String,
        actual: String,
    },
}

/// Names of the checks that passed, in run order.
#[derive(Debug, Clone, Default)]
pub struct HarnessReport {
    pub passed: Vec<String>,
}

impl HarnessReport {
    fn pass(&mut self, check: &str) {
        debug!(check = %check, "Check passed");
        self.passed.push(check.to_string());
    }
}

pub struct ConformanceHarness {
    connection: Connection,
    schema: Option<String>,
}

impl ConformanceHarness {
    /// `schema` falls back to the dialect's default scope.
    pub fn new(connection: Connection, schema: Option<String>) -> Self {
        let schema = schema.or_else(|| {
            connection
                .dialect()
                .default_schema()
                .map(String::from)
        });
        Self { connection, schema }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Connect if needed, then rebuild and seed the fixture.
    pub async fn setup(&self) -> Result<SeedIds, HarnessError> {
        if self.connection.state().await == ConnectionState::Unconnected {
            self.connection.connect().await?;
        }
        fixture::create_tables(&self.connection, self.schema())
            .await
            .map_err(HarnessError::Setup)?;
        fixture::seed(&self.connection, self.schema())
            .await
            .map_err(HarnessError::Setup)
    }

    /// Drop the fixture and close the connection.
    pub async fn teardown(&self) -> Result<(), HarnessError> {
        fixture::drop_tables(&self.connection, self.schema()).await?;
        self.connection.close().await?;
        Ok(())
    }

    /// Set up the fixture and run every check.
    pub async fn run(&self) -> Result<HarnessReport, HarnessError> {
        self.setup().await?;
        let mut report = HarnessReport::default();

        self.check_catalog(&mut report).await?;
        self.check_primary_keys(&mut report).await?;
        self.check_foreign_keys(&mut report).await?;
        self.check_table_view(&mut report).await?;

        info!(
            dialect = %self.connection.dialect(),
            checks = report.passed.len(),
            "Conformance checks passed"
        );
        Ok(report)
    }

    async fn check_catalog(&self, report: &mut HarnessReport) -> Result<(), HarnessError> {
        let schema = self.schema();

        let tables = self.connection.list_tables(schema).await?;
        let mut expected: Vec<String> = FIXTURE_TABLES.iter().map(|t| t.to_string()).collect();
        expected.sort();
        expect_eq("list_tables", &expected, &tables)?;
        report.pass("list_tables");

        let columns = self.connection.list_table_columns("people", schema).await?;
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        expect_eq(
            "list_table_columns",
            &vec![
                "id",
                "created_at",
                "updated_at",
                "firstname",
                "lastname",
                "email",
                "address_id",
            ],
            &names,
        )?;
        report.pass("list_table_columns");

        let again = self.connection.list_tables(schema).await?;
        expect_eq("list_tables_idempotent", &tables, &again)?;
        let columns_again = self.connection.list_table_columns("people", schema).await?;
        expect_eq("list_table_columns_idempotent", &columns, &columns_again)?;
        report.pass("idempotent_introspection");

        Ok(())
    }

    async fn check_primary_keys(&self, report: &mut HarnessReport) -> Result<(), HarnessError> {
        let schema = self.schema();
        let id = Some("id".to_string());

        let pk = self.connection.get_primary_key("people", schema).await?;
        expect_eq("primary_key_people", &id, &pk)?;
        report.pass("primary_key_people");

        let pk = self.connection.get_primary_key("group", schema).await?;
        expect_eq("primary_key_reserved_word", &id, &pk)?;
        report.pass("primary_key_reserved_word");

        let pk = self.connection.get_primary_key("with_composite_pk", schema).await?;
        expect_eq("primary_key_composite", &None, &pk)?;
        report.pass("primary_key_composite");

        let keys = self.connection.get_primary_keys("with_composite_pk", schema).await?;
        expect_eq(
            "primary_keys_composite",
            &vec!["id1".to_string(), "id2".to_string()],
            &keys,
        )?;
        report.pass("primary_keys_composite");

        Ok(())
    }

    async fn check_foreign_keys(&self, report: &mut HarnessReport) -> Result<(), HarnessError> {
        let keys = self.connection.get_table_keys("people", self.schema()).await?;
        if !keys.iter().any(|fk| fk.links("address_id", "addresses", "id")) {
            return Err(mismatch(
                "table_keys_people",
                &"address_id -> addresses.id",
                &keys,
            ));
        }
        report.pass("table_keys_people");

        let keys = self.connection.get_table_keys("people_jobs", self.schema()).await?;
        expect_eq("table_keys_people_jobs", &2, &keys.len())?;
        report.pass("table_keys_people_jobs");

        Ok(())
    }

    async fn check_table_view(&self, report: &mut HarnessReport) -> Result<(), HarnessError> {
        let schema = self.schema();
        let by_select = [SortSpec::asc("select")];
        let by_select_desc = [SortSpec::desc("select")];

        let empty = self
            .connection
            .select_top("group", 0, 10, &by_select, None, schema)
            .await?;
        expect_eq("select_top_empty", &SelectTopResult::empty(), &empty)?;
        report.pass("select_top_empty");

        fixture::insert_group_rows(&self.connection, &["bar", "abc"], schema).await?;

        let page = self
            .connection
            .select_top("group", 0, 10, &by_select, None, schema)
            .await?;
        expect_eq("select_top_asc", &vec!["abc", "bar"], &select_values(&page))?;
        report.pass("select_top_asc");

        let page = self
            .connection
            .select_top("group", 0, 10, &by_select_desc, None, schema)
            .await?;
        expect_eq("select_top_desc", &vec!["bar", "abc"], &select_values(&page))?;
        report.pass("select_top_desc");

        let page = self
            .connection
            .select_top("group", 0, 1, &by_select_desc, None, schema)
            .await?;
        expect_eq("select_top_limit", &vec!["bar"], &select_values(&page))?;
        expect_eq("select_top_limit_total", &2, &page.total_records)?;
        report.pass("select_top_limit");

        let page = self
            .connection
            .select_top("group", 1, 10, &by_select_desc, None, schema)
            .await?;
        expect_eq("select_top_offset", &vec!["abc"], &select_values(&page))?;
        expect_eq("select_top_offset_total", &2, &page.total_records)?;
        report.pass("select_top_offset");

        let filters = [Filter::eq("select", "bar")];
        let page = self
            .connection
            .select_top("group", 0, 10, &by_select, Some(&filters[..]), schema)
            .await?;
        expect_eq("select_top_filtered", &vec!["bar"], &select_values(&page))?;
        expect_eq("select_top_filtered_total", &1, &page.total_records)?;
        report.pass("select_top_filtered");

        Ok(())
    }
}

/// The `select` column of each row, in page order.
fn select_values(page: &SelectTopResult) -> Vec<&str> {
    page.result
        .iter()
        .map(|row| row.get("select").and_then(|v| v.as_str()).unwrap_or_default())
        .collect()
}

fn expect_eq<T: PartialEq + Debug + ?Sized>(
    check: &str,
    expected: &T,
    actual: &T,
) -> Result<(), HarnessError> {
    if expected == actual {
        Ok(())
    } else {
        Err(mismatch(check, expected, actual))
    }
}

fn mismatch<E: Debug + ?Sized, A: Debug + ?Sized>(check: &str, expected: &E, actual: &A) -> HarnessError {
    HarnessError::Mismatch {
        check: check.to_string(),
        expected: format!("{:?}", expected),
        actual: format!("{:?}", actual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_eq() {
        assert!(expect_eq("same", &1, &1).is_ok());
        let err = expect_eq("differs", &vec!["a"], &vec!["b"]).unwrap_err();
        match err {
            HarnessError::Mismatch {
                check,
                expected,
                actual,
            } => {
                assert_eq!(check, "differs");
                assert_eq!(expected, "[\"a\"]");
                assert_eq!(actual, "[\"b\"]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_select_values_missing_column() {
        let mut row = serde_json::Map::new();
        row.insert("select".into(), serde_json::json!("abc"));
        let page = SelectTopResult {
            result: vec![row, serde_json::Map::new()],
            total_records: 2,
        };
        assert_eq!(select_values(&page), vec!["abc", ""]);
    }

    #[test]
    fn test_setup_error_display() {
        let err = HarnessError::Setup(DbError::NotConnected);
        assert!(err.to_string().starts_with("Fixture setup failed"));
    }
}
