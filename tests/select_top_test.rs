//! Integration tests for select_top and the connection state machine.
//!
//! Tests verify that:
//! - Sorting, filtering and pagination compose as filter -> sort -> skip -> take
//! - total_records ignores pagination but honours filters
//! - Bad table, sort and filter references fail as query errors
//! - Every operation fails fast outside the connected state

use db_client::create_server;
use db_client::db::{Connection, SelectTopRequest};
use db_client::error::DbError;
use db_client::fixture;
use db_client::models::{
    ConnectionConfig, Dialect, Filter, FilterOperator, QueryParam, SortSpec,
};
use rand::seq::SliceRandom;

async fn fixture_connection() -> Connection {
    let server = create_server(ConnectionConfig::new(Dialect::SQLite)).unwrap();
    let conn = server.create_connection(":memory:");
    conn.connect().await.unwrap();
    fixture::create_tables(&conn, None).await.unwrap();
    fixture::seed(&conn, None).await.unwrap();
    conn
}

fn selects(page: &db_client::models::SelectTopResult) -> Vec<String> {
    page.column_values("select")
        .into_iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_empty_table() {
    let conn = fixture_connection().await;
    let page = conn
        .select_top("group", 0, 10, &[SortSpec::asc("select")], None, None)
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(page.total_records, 0);
}

#[tokio::test]
async fn test_sort_any_insertion_order() {
    let conn = fixture_connection().await;
    let mut values = vec!["delta", "alpha", "echo", "charlie", "bravo"];
    values.shuffle(&mut rand::thread_rng());
    fixture::insert_group_rows(&conn, &values, None).await.unwrap();

    let page = conn
        .select_top("group", 0, 10, &[SortSpec::asc("select")], None, None)
        .await
        .unwrap();
    assert_eq!(selects(&page), vec!["alpha", "bravo", "charlie", "delta", "echo"]);
    assert_eq!(page.total_records, 5);

    let page = conn
        .select_top("group", 1, 2, &[SortSpec::desc("select")], None, None)
        .await
        .unwrap();
    assert_eq!(selects(&page), vec!["delta", "charlie"]);
    assert_eq!(page.total_records, 5);
}

#[tokio::test]
async fn test_multi_key_sort() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["b", "a", "b", "a"], None)
        .await
        .unwrap();

    let sort = [SortSpec::asc("select"), SortSpec::desc("id")];
    let page = conn
        .select_top("group", 0, 10, &sort, None, None)
        .await
        .unwrap();
    let ids: Vec<i64> = page
        .column_values("id")
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    assert_eq!(ids, vec![4, 2, 3, 1]);
}

#[tokio::test]
async fn test_sort_spec_from_json() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["bar", "abc"], None)
        .await
        .unwrap();

    let sort: Vec<SortSpec> =
        serde_json::from_str(r#"[{"field": "select", "dir": "desc"}]"#).unwrap();
    let page = conn
        .select_top("group", 0, 10, &sort, None, None)
        .await
        .unwrap();
    assert_eq!(selects(&page), vec!["bar", "abc"]);
}

#[tokio::test]
async fn test_offset_past_end() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["bar", "abc"], None)
        .await
        .unwrap();

    let page = conn
        .select_top("group", 5, 10, &[SortSpec::asc("select")], None, None)
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(page.total_records, 2);
}

#[tokio::test]
async fn test_offset_beyond_any_row_index() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["bar", "abc"], None)
        .await
        .unwrap();

    for offset in [i64::MAX as u64, i64::MAX as u64 + 1, u64::MAX] {
        let page = conn
            .select_top("group", offset, 10, &[SortSpec::asc("select")], None, None)
            .await
            .unwrap();
        assert!(page.is_empty(), "offset {offset}");
        assert_eq!(page.total_records, 2);
    }
}

#[tokio::test]
async fn test_limit_zero_still_counts() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["bar", "abc"], None)
        .await
        .unwrap();

    let page = conn
        .select_top("group", 0, 0, &[SortSpec::asc("select")], None, None)
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(page.total_records, 2);
}

#[tokio::test]
async fn test_filters() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["bar", "abc", "baz"], None)
        .await
        .unwrap();
    let sort = [SortSpec::asc("select")];

    let like = [Filter::new("select", FilterOperator::Like, "ba%")];
    let page = conn
        .select_top("group", 0, 1, &sort, Some(&like[..]), None)
        .await
        .unwrap();
    assert_eq!(selects(&page), vec!["bar"]);
    assert_eq!(page.total_records, 2);

    let combined = [
        Filter::new("select", FilterOperator::Like, "ba%"),
        Filter::new("select", FilterOperator::Neq, "bar"),
    ];
    let page = conn
        .select_top("group", 0, 10, &sort, Some(&combined[..]), None)
        .await
        .unwrap();
    assert_eq!(selects(&page), vec!["baz"]);

    let by_id = [Filter::new("id", FilterOperator::Gte, 2i64)];
    let page = conn
        .select_top("group", 0, 10, &sort, Some(&by_id[..]), None)
        .await
        .unwrap();
    assert_eq!(selects(&page), vec!["abc", "baz"]);
}

#[tokio::test]
async fn test_null_filters() {
    let conn = fixture_connection().await;

    let is_null = [Filter::new("firstname", FilterOperator::IsNull, QueryParam::Null)];
    let page = conn
        .select_top("people", 0, 10, &[], Some(&is_null[..]), None)
        .await
        .unwrap();
    assert_eq!(page.total_records, 1);

    let eq_null = [Filter::eq("email", QueryParam::Null)];
    let page = conn
        .select_top("people", 0, 10, &[], Some(&eq_null[..]), None)
        .await
        .unwrap();
    assert_eq!(page.total_records, 0);
}

#[tokio::test]
async fn test_filter_values_are_bound() {
    let conn = fixture_connection().await;
    fixture::insert_group_rows(&conn, &["bar"], None).await.unwrap();

    let hostile = [Filter::eq("select", "x' OR '1'='1")];
    let page = conn
        .select_top("group", 0, 10, &[], Some(&hostile[..]), None)
        .await
        .unwrap();
    assert_eq!(page.total_records, 0);
}

#[tokio::test]
async fn test_select_request_struct() {
    let conn = fixture_connection().await;
    let request = SelectTopRequest {
        limit: 10,
        ..SelectTopRequest::new("jobs")
    };
    let page = conn.select(&request).await.unwrap();
    assert_eq!(page.total_records, 1);
    assert_eq!(page.result[0]["job_name"], "Programmer");
}

#[tokio::test]
async fn test_unknown_references() {
    let conn = fixture_connection().await;

    let err = conn
        .select_top("nope", 0, 10, &[], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query { ref object, .. } if object == "nope"));

    let err = conn
        .select_top("group", 0, 10, &[SortSpec::asc("missing")], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query { ref object, .. } if object == "missing"));

    let filters = [Filter::eq("missing", 1i64)];
    let err = conn
        .select_top("group", 0, 10, &[], Some(&filters[..]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));

    assert!(matches!(
        conn.list_table_columns("nope", None).await,
        Err(DbError::Query { .. })
    ));
    assert!(matches!(
        conn.get_primary_key("nope", None).await,
        Err(DbError::Query { .. })
    ));
    assert!(matches!(
        conn.get_table_keys("nope", None).await,
        Err(DbError::Query { .. })
    ));
}

#[tokio::test]
async fn test_state_machine() {
    let server = create_server(ConnectionConfig::new(Dialect::SQLite)).unwrap();
    let conn = server.create_connection(":memory:");

    assert!(matches!(
        conn.select_top("group", 0, 10, &[], None, None).await,
        Err(DbError::NotConnected)
    ));
    assert!(matches!(conn.list_schemas().await, Err(DbError::NotConnected)));

    conn.connect().await.unwrap();
    let clone = conn.clone();
    clone.close().await.unwrap();

    assert!(matches!(
        conn.get_primary_key("group", None).await,
        Err(DbError::ConnectionClosed)
    ));
    assert!(matches!(conn.connect().await, Err(DbError::ConnectionClosed)));
}

#[tokio::test]
async fn test_connections_are_independent() {
    let server = create_server(ConnectionConfig::new(Dialect::SQLite)).unwrap();
    let first = server.create_connection(":memory:");
    let second = server.create_connection(":memory:");
    first.connect().await.unwrap();
    second.connect().await.unwrap();

    fixture::create_tables(&first, None).await.unwrap();
    assert_eq!(first.list_tables(None).await.unwrap().len(), 6);
    assert!(second.list_tables(None).await.unwrap().is_empty());

    first.close().await.unwrap();
    assert!(second.list_tables(None).await.is_ok());
}
