//! The shared conformance fixture.
//!
//! Six tables exercising reserved-word names, single and composite primary
//! keys and foreign keys, plus one seeded row chain
//! (address <- person <- people_jobs -> job).

pub mod builder;

pub use builder::TableBuilder;

use crate::db::Connection;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use tracing::{debug, info};

/// Fixture tables in creation order; parents come before children.
pub const FIXTURE_TABLES: [&str; 6] = [
    "addresses",
    "group",
    "people",
    "jobs",
    "people_jobs",
    "with_composite_pk",
];

/// Keys generated while seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedIds {
    pub address_id: i64,
    pub person_id: i64,
    pub job_id: i64,
}

/// The fixture table definitions, in creation order.
pub fn fixture_tables() -> DbResult<Vec<TableBuilder>> {
    Ok(vec![
        TableBuilder::new("addresses")
            .increments("id")
            .timestamps()
            .string("street")
            .string("city")
            .string("state")
            .string("country")
            .not_nullable(),
        TableBuilder::new("group").increments("id").string("select"),
        TableBuilder::new("people")
            .increments("id")
            .timestamps()
            .string("firstname")
            .string("lastname")
            .string("email")
            .not_nullable()
            .integer("address_id")
            .not_nullable()
            .unsigned()
            .foreign("address_id", "addresses.id")?,
        TableBuilder::new("jobs")
            .increments("id")
            .timestamps()
            .string("job_name")
            .not_nullable()
            .decimal("hourly_rate"),
        TableBuilder::new("people_jobs")
            .integer("person_id")
            .not_nullable()
            .unsigned()
            .integer("job_id")
            .not_nullable()
            .unsigned()
            .foreign("person_id", "people.id")?
            .foreign("job_id", "jobs.id")?
            .primary(&["person_id", "job_id"])
            .timestamps(),
        TableBuilder::new("with_composite_pk")
            .integer("id1")
            .not_nullable()
            .unsigned()
            .integer("id2")
            .not_nullable()
            .unsigned()
            .primary(&["id1", "id2"]),
    ])
}

/// Drop every fixture table that exists, children first.
pub async fn drop_tables(conn: &Connection, schema: Option<&str>) -> DbResult<()> {
    let dialect = conn.dialect();
    for table in fixture_tables()?.iter().rev() {
        conn.execute(&table.drop_sql(dialect, schema), &[]).await?;
    }
    debug!(dialect = %dialect, "Dropped fixture tables");
    Ok(())
}

/// Create the fixture tables from scratch.
pub async fn create_tables(conn: &Connection, schema: Option<&str>) -> DbResult<()> {
    let dialect = conn.dialect();
    drop_tables(conn, schema).await?;
    for table in fixture_tables()? {
        conn.execute(&table.create_sql(dialect, schema), &[]).await?;
        debug!(dialect = %dialect, table = %table.name(), "Created fixture table");
    }
    info!(dialect = %dialect, tables = FIXTURE_TABLES.len(), "Created fixture tables");
    Ok(())
}

/// Insert the seed chain and return the generated keys.
pub async fn seed(conn: &Connection, schema: Option<&str>) -> DbResult<SeedIds> {
    let address_id = insert_with_id(conn, "addresses", vec![("country", "US".into())], schema).await?;
    let person_id = insert_with_id(
        conn,
        "people",
        vec![
            ("email", "foo@bar.com".into()),
            ("address_id", address_id.into()),
        ],
        schema,
    )
    .await?;
    let job_id = insert_with_id(conn, "jobs", vec![("job_name", "Programmer".into())], schema).await?;

    conn.insert_row(
        "people_jobs",
        &row(vec![("job_id", job_id.into()), ("person_id", person_id.into())]),
        None,
        schema,
    )
    .await?;

    info!(address_id, person_id, job_id, "Seeded fixture rows");
    Ok(SeedIds {
        address_id,
        person_id,
        job_id,
    })
}

/// Insert rows into `group`, one `select` value each.
pub async fn insert_group_rows(conn: &Connection, values: &[&str], schema: Option<&str>) -> DbResult<()> {
    for value in values {
        conn.insert_row("group", &row(vec![("select", (*value).into())]), None, schema)
            .await?;
    }
    Ok(())
}

async fn insert_with_id(
    conn: &Connection,
    table: &str,
    values: Vec<(&str, QueryParam)>,
    schema: Option<&str>,
) -> DbResult<i64> {
    conn.insert_row(table, &row(values), Some("id"), schema)
        .await?
        .ok_or_else(|| DbError::internal(format!("No id generated for '{}'", table)))
}

fn row(values: Vec<(&str, QueryParam)>) -> Vec<(String, QueryParam)> {
    values
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}
