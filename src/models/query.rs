//! Query-related data models.
//!
//! This module defines scalar parameter values, bound statements and the
//! canonical result shape shared by every engine.

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Ceiling for statement timeouts in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// A scalar value: the only thing a parameter or a result cell may hold.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text view used when normalizing catalog rows.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl TryFrom<&JsonValue> for ScalarValue {
    type Error = String;

    /// Accept JSON scalars only; arrays and objects are rejected.
    fn try_from(value: &JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| format!("number {} is out of range", n)),
            },
            JsonValue::String(s) => Ok(Self::Text(s.clone())),
            JsonValue::Array(_) => Err("arrays are not allowed as parameter values".to_string()),
            JsonValue::Object(_) => Err("objects are not allowed as parameter values".to_string()),
        }
    }
}

/// Named parameters in canonical form, ordered by name for stable logging.
pub type NamedParams = BTreeMap<String, ScalarValue>;

/// Parameters in the shape the target driver binds them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeParams {
    /// No parameters.
    #[default]
    None,
    /// `$n` (PostgreSQL) or `?` (MySQL) placeholders, bound in order.
    Positional(Vec<ScalarValue>),
    /// `:name` bind variables (Oracle).
    Named(Vec<(String, ScalarValue)>),
}

impl NativeParams {
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A statement in engine-native placeholder syntax plus its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: NativeParams,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: NativeParams) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A statement without parameters.
    pub fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, NativeParams::None)
    }

    pub fn with_sql(&self, sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: self.params.clone(),
        }
    }
}

/// Rows as fetched from a connection, before truncation is decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
}

/// Engine-independent query result.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct CanonicalResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
    /// Number of rows returned; the limited count when `truncated` is set.
    pub row_count: usize,
    /// True when the statement produced more rows than the limit.
    pub truncated: bool,
}

impl CanonicalResult {
    /// Build a result from rows fetched with one row of lookahead.
    ///
    /// Connections are asked for `limit + 1` rows; seeing the extra row is
    /// what marks the result as truncated.
    pub fn from_fetched(fetched: FetchedRows, limit: usize) -> Self {
        let FetchedRows { columns, mut rows } = fetched;
        let truncated = rows.len() > limit;
        rows.truncate(limit);
        Self {
            columns,
            row_count: rows.len(),
            rows,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_from_json() {
        assert_eq!(ScalarValue::try_from(&json!(null)).unwrap(), ScalarValue::Null);
        assert_eq!(ScalarValue::try_from(&json!(true)).unwrap(), ScalarValue::Bool(true));
        assert_eq!(ScalarValue::try_from(&json!(42)).unwrap(), ScalarValue::Int(42));
        assert_eq!(ScalarValue::try_from(&json!(1.5)).unwrap(), ScalarValue::Float(1.5));
        assert_eq!(
            ScalarValue::try_from(&json!("O'Brien")).unwrap(),
            ScalarValue::Text("O'Brien".into())
        );
    }

    #[test]
    fn test_scalar_rejects_nested_values() {
        assert!(ScalarValue::try_from(&json!([1, 2])).is_err());
        assert!(ScalarValue::try_from(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_scalar_serializes_untagged() {
        let row = vec![
            ScalarValue::Int(1),
            ScalarValue::Null,
            ScalarValue::Text("x".into()),
            ScalarValue::Bool(false),
        ];
        assert_eq!(serde_json::to_value(&row).unwrap(), json!([1, null, "x", false]));
    }

    #[test]
    fn test_from_fetched_not_truncated() {
        let fetched = FetchedRows {
            columns: vec!["?column?".into()],
            rows: vec![vec![ScalarValue::Int(1)]],
        };
        let result = CanonicalResult::from_fetched(fetched, 100);
        assert_eq!(result.row_count, 1);
        assert!(!result.truncated);
    }

    #[test]
    fn test_from_fetched_truncated() {
        let rows = (0..101).map(|i| vec![ScalarValue::Int(i)]).collect();
        let fetched = FetchedRows {
            columns: vec!["id".into()],
            rows,
        };
        let result = CanonicalResult::from_fetched(fetched, 100);
        assert_eq!(result.row_count, 100);
        assert_eq!(result.rows.len(), 100);
        assert!(result.truncated);
    }

    #[test]
    fn test_from_fetched_exactly_at_limit() {
        let rows = (0..100).map(|i| vec![ScalarValue::Int(i)]).collect();
        let result = CanonicalResult::from_fetched(
            FetchedRows {
                columns: vec!["id".into()],
                rows,
            },
            100,
        );
        assert!(!result.truncated);
        assert_eq!(result.row_count, 100);
    }

    #[test]
    fn test_native_params_len() {
        assert!(NativeParams::None.is_empty());
        assert_eq!(
            NativeParams::Positional(vec![ScalarValue::Int(1), ScalarValue::Null]).len(),
            2
        );
    }
}
