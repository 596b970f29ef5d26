//! Database-agnostic type mappings.
//!
//! This module maps driver rows into JSON records keyed by column name.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Dialect-specific decoders handle the actual value extraction
//!
//! SQL Server rows arrive as tiberius `ColumnData` and are converted
//! directly without going through the category table.

use crate::models::Dialect;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // SQLite stores dates as text; its driver decodes them as strings
    if dialect != Dialect::SQLite
        && (lower.starts_with("timestamp")
            || lower.starts_with("datetime")
            || lower == "date"
            || lower.starts_with("time"))
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") || lower == "string" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Scalar Encoding
// =============================================================================

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn datetime_value(v: chrono::NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format(DATETIME_FORMAT).to_string())
}

fn utc_value(v: chrono::DateTime<chrono::Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn date_value(v: chrono::NaiveDate) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%d").to_string())
}

fn time_value(v: chrono::NaiveTime) -> JsonValue {
    JsonValue::String(v.format("%H:%M:%S%.f").to_string())
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
///
/// Keys follow the row's column order, which for `SELECT *` is table order.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::MySQL);
                let value = mysql::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::PostgreSQL);
                let value = postgres::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::SQLite);
                let value = sqlite::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for tiberius::Row {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.cells()
            .enumerate()
            .map(|(idx, (col, data))| (col.name().to_string(), mssql::decode_cell(self, idx, data)))
            .collect()
    }
}

// =============================================================================
// Dialect-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // Unsigned columns (the fixture's `increments()` ids)
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        match type_name.to_uppercase().as_str() {
            "TIMESTAMP" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .ok()
                .flatten()
                .map(utc_value)
                .unwrap_or(JsonValue::Null),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map(date_value)
                .unwrap_or(JsonValue::Null),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(idx)
                .ok()
                .flatten()
                .map(time_value)
                .unwrap_or(JsonValue::Null),
            _ => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map(datetime_value)
                .unwrap_or(JsonValue::Null),
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        // VARBINARY-typed text (some catalog views, binary collations)
        if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return match String::from_utf8(v) {
                Ok(s) => JsonValue::String(s),
                Err(e) => encode_binary_value(e.as_bytes()),
            };
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(utc_value).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v.map(datetime_value).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v.map(date_value).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v.map(time_value).unwrap_or(JsonValue::Null);
        }
        JsonValue::Null
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<i64>, _>(idx) {
            Ok(Some(v)) => JsonValue::Number(v.into()),
            _ => JsonValue::Null,
        }
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        // Dynamic typing: a TEXT-declared column may still hold a number
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        JsonValue::Null
    }
}

mod mssql {
    use super::*;
    use tiberius::ColumnData;

    pub fn decode_cell(row: &tiberius::Row, idx: usize, data: &ColumnData<'_>) -> JsonValue {
        match data {
            ColumnData::Bit(Some(b)) => JsonValue::Bool(*b),
            ColumnData::U8(Some(v)) => JsonValue::Number((*v).into()),
            ColumnData::I16(Some(v)) => JsonValue::Number((*v).into()),
            ColumnData::I32(Some(v)) => JsonValue::Number((*v).into()),
            ColumnData::I64(Some(v)) => JsonValue::Number((*v).into()),
            ColumnData::F32(Some(v)) => float_value(*v as f64),
            ColumnData::F64(Some(v)) => float_value(*v),
            ColumnData::Numeric(Some(n)) => JsonValue::String(n.to_string()),
            ColumnData::String(Some(s)) => JsonValue::String(s.to_string()),
            ColumnData::Guid(Some(g)) => JsonValue::String(g.to_string()),
            ColumnData::Binary(Some(b)) => encode_binary_value(b),
            ColumnData::Xml(Some(xml)) => JsonValue::String(xml.to_string()),
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(idx)
                .ok()
                .flatten()
                .map(datetime_value)
                .unwrap_or(JsonValue::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
                .ok()
                .flatten()
                .map(utc_value)
                .unwrap_or(JsonValue::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(idx)
                .ok()
                .flatten()
                .map(date_value)
                .unwrap_or(JsonValue::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<chrono::NaiveTime, _>(idx)
                .ok()
                .flatten()
                .map(time_value)
                .unwrap_or(JsonValue::Null),
            _ => JsonValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT", Dialect::MySQL), TypeCategory::Integer);
        assert_eq!(
            categorize_type("BIGINT", Dialect::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT UNSIGNED", Dialect::MariaDB),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT8", Dialect::CockroachDB),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", Dialect::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", Dialect::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", Dialect::PostgreSQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("numeric", Dialect::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", Dialect::PostgreSQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATETIME", Dialect::MySQL),
            TypeCategory::Temporal
        );
        assert_eq!(categorize_type("DATE", Dialect::MariaDB), TypeCategory::Temporal);
        // SQLite keeps dates as text
        assert_eq!(
            categorize_type("DATETIME", Dialect::SQLite),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_text() {
        assert_eq!(
            categorize_type("VARCHAR", Dialect::PostgreSQL),
            TypeCategory::Text
        );
        assert_eq!(categorize_type("TEXT", Dialect::SQLite), TypeCategory::Text);
        assert_eq!(categorize_type("jsonb", Dialect::CockroachDB), TypeCategory::Json);
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }

    #[test]
    fn test_temporal_formatting() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        assert_eq!(datetime_value(dt), JsonValue::String("2024-03-05 07:08:09".into()));
        assert_eq!(
            date_value(dt.date()),
            JsonValue::String("2024-03-05".into())
        );
    }
}
