//! Query-related data models.
//!
//! This module defines types for paginated select requests and results.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    #[default]
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort key: a bare column name (ascending) or an explicit pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Column(String),
    Explicit {
        #[serde(alias = "field")]
        column: String,
        #[serde(default, alias = "dir")]
        direction: SortDirection,
    },
}

impl SortSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self::Column(column.into())
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::Explicit {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Column(column) | Self::Explicit { column, .. } => column,
        }
    }

    pub fn direction(&self) -> SortDirection {
        match self {
            Self::Column(_) => SortDirection::Asc,
            Self::Explicit { direction, .. } => *direction,
        }
    }
}

impl From<&str> for SortSpec {
    fn from(column: &str) -> Self {
        Self::Column(column.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// SQL operator text; null checks take no operand.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// A single predicate; a filter list is AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(alias = "field")]
    pub column: String,
    #[serde(alias = "type")]
    pub operator: FilterOperator,
    /// Ignored by `is_null` and `is_not_null`
    #[serde(default)]
    pub value: QueryParam,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<QueryParam>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::new(column, FilterOperator::Eq, value)
    }
}

/// One page of rows plus the unpaginated match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectTopResult {
    /// Row records keyed by column name, in table column order
    pub result: Vec<serde_json::Map<String, JsonValue>>,
    pub total_records: u64,
}

impl SelectTopResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Values of one column across the page, in page order.
    pub fn column_values(&self, column: &str) -> Vec<JsonValue> {
        self.result
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(JsonValue::Null))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(
            QueryParam::String("hello".to_string()).type_name(),
            "string"
        );
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
    }

    #[test]
    fn test_sort_spec_mixed_forms() {
        let specs: Vec<SortSpec> = serde_json::from_value(json!([
            "select",
            {"column": "id", "direction": "desc"},
            {"field": "name", "dir": "asc"},
            {"column": "city"}
        ]))
        .unwrap();

        assert_eq!(specs[0], SortSpec::asc("select"));
        assert_eq!(specs[1], SortSpec::desc("id"));
        assert_eq!(specs[2].column(), "name");
        assert_eq!(specs[2].direction(), SortDirection::Asc);
        assert_eq!(specs[3].direction(), SortDirection::Asc);
    }

    #[test]
    fn test_filter_deserialize() {
        let filter: Filter =
            serde_json::from_value(json!({"column": "city", "operator": "eq", "value": "Oslo"}))
                .unwrap();
        assert_eq!(filter, Filter::eq("city", "Oslo"));

        let filter: Filter =
            serde_json::from_value(json!({"field": "street", "type": "is_null"})).unwrap();
        assert_eq!(filter.operator, FilterOperator::IsNull);
        assert!(filter.value.is_null());
        assert!(!filter.operator.takes_value());
    }

    #[test]
    fn test_select_top_result_column_values() {
        let mut row = serde_json::Map::new();
        row.insert("select".into(), json!("abc"));
        let result = SelectTopResult {
            result: vec![row],
            total_records: 2,
        };
        assert_eq!(result.column_values("select"), vec![json!("abc")]);
        assert_eq!(result.column_values("missing"), vec![JsonValue::Null]);
        assert!(SelectTopResult::empty().is_empty());
    }
}
