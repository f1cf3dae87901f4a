//! Row decoding into [`ScalarValue`].
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's type name into a logical category
//! 2. Engine-specific decoders extract the value for that category
//!
//! Everything that has no scalar counterpart (decimals, temporal types, JSON,
//! UUIDs, binary data) is rendered as text so no precision is lost.

use crate::models::{DatabaseType, ScalarValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

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
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric first: "numeric" would otherwise never match below
    if lower.contains("decimal") || lower.contains("numeric") || lower == "number" {
        return TypeCategory::Decimal;
    }

    // MySQL reports BOOLEAN columns as TINYINT(1); those decode as integers.
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "binary_float"
        || lower == "binary_double"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower == "timestamptz" || lower.contains("with time zone") {
        return TypeCategory::TimestampTz;
    }
    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    // Oracle DATE carries a time component.
    if lower == "date" {
        return match db {
            DatabaseType::Oracle => TypeCategory::Timestamp,
            _ => TypeCategory::Date,
        };
    }
    if lower == "time" || lower == "timetz" {
        return TypeCategory::Time;
    }

    if lower.contains("blob")
        || lower.contains("binary")
        || lower == "bytea"
        || lower == "raw"
        || lower == "bit"
    {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower.contains("clob") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC text, used when the value does not fit `Decimal`.
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
// Scalar helpers
// =============================================================================

/// Binary data is returned base64-encoded.
pub fn encode_binary(bytes: &[u8]) -> ScalarValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    ScalarValue::Text(STANDARD.encode(bytes))
}

/// Non-finite floats have no JSON number form.
pub fn float_value(v: f64) -> ScalarValue {
    if v.is_finite() {
        ScalarValue::Float(v)
    } else {
        ScalarValue::Text(v.to_string())
    }
}

fn text_or_null(value: Option<String>) -> ScalarValue {
    value.map_or(ScalarValue::Null, ScalarValue::Text)
}

fn undecodable(type_name: &str, column: usize) -> ScalarValue {
    tracing::debug!(type_name, column, "Unsupported column type, returning NULL");
    ScalarValue::Null
}

// =============================================================================
// Row decoding
// =============================================================================

/// Column names of a PostgreSQL row.
pub fn pg_columns(row: &PgRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Column names of a MySQL row.
pub fn mysql_columns(row: &MySqlRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

pub fn pg_row(row: &PgRow) -> Vec<ScalarValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::PostgreSQL);
            postgres::decode_column(row, idx, type_name, category)
        })
        .collect()
}

pub fn mysql_row(row: &MySqlRow) -> Vec<ScalarValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            mysql::decode_column(row, idx, type_name, category)
        })
        .collect()
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::types::Decimal;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> ScalarValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Timestamp | TypeCategory::TimestampTz => decode_datetime(row, idx),
            TypeCategory::Date => try_text::<NaiveDate>(row, idx),
            TypeCategory::Time => try_text::<NaiveTime>(row, idx),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn try_text<T>(row: &MySqlRow, idx: usize) -> ScalarValue
    where
        T: for<'r> Decode<'r, sqlx::MySql> + Type<sqlx::MySql> + ToString,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(v) => text_or_null(v.map(|v| v.to_string())),
            Err(_) => ScalarValue::Null,
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> ScalarValue {
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return text_or_null(v.map(|d| d.to_string()));
        }
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => text_or_null(v.map(|d| d.0)),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                ScalarValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> ScalarValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map_or(ScalarValue::Null, ScalarValue::Int);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        // Unsigned BIGINT may exceed i64.
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return i64::try_from(v).map_or_else(|_| ScalarValue::Text(v.to_string()), ScalarValue::Int);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        ScalarValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> ScalarValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map_or(ScalarValue::Null, ScalarValue::Bool)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> ScalarValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(f64::from(v));
        }
        ScalarValue::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> ScalarValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map_or(ScalarValue::Null, |v| encode_binary(&v))
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> ScalarValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map_or(ScalarValue::Null, |v| ScalarValue::Text(v.to_string()))
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> ScalarValue {
        if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return text_or_null(v.map(|d| d.to_string()));
        }
        try_text::<DateTime<Utc>>(row, idx)
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> ScalarValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => text_or_null(v),
            // VARBINARY-collated text columns and exotic types
            Err(_) => match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
                Ok(Some(bytes)) => match String::from_utf8(bytes) {
                    Ok(s) => ScalarValue::Text(s),
                    Err(e) => encode_binary(e.as_bytes()),
                },
                Ok(None) => ScalarValue::Null,
                Err(_) => undecodable(type_name, idx),
            },
        }
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::types::{Decimal, Uuid};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> ScalarValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => try_text::<Uuid>(row, idx),
            TypeCategory::Timestamp => try_text::<NaiveDateTime>(row, idx),
            TypeCategory::TimestampTz => match row.try_get::<Option<DateTime<Utc>>, _>(idx) {
                Ok(v) => text_or_null(v.map(|d| d.to_rfc3339())),
                Err(_) => ScalarValue::Null,
            },
            TypeCategory::Date => try_text::<NaiveDate>(row, idx),
            TypeCategory::Time => try_text::<NaiveTime>(row, idx),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn try_text<T>(row: &PgRow, idx: usize) -> ScalarValue
    where
        T: for<'r> Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres> + ToString,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(v) => text_or_null(v.map(|v| v.to_string())),
            Err(_) => ScalarValue::Null,
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> ScalarValue {
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return text_or_null(v.map(|d| d.to_string()));
        }
        // Text-format rows (simple protocol) and values outside Decimal's range
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => text_or_null(v.map(|d| d.0)),
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                ScalarValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> ScalarValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map_or(ScalarValue::Null, ScalarValue::Int);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return ScalarValue::Int(v.into());
        }
        ScalarValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> ScalarValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map_or(ScalarValue::Null, ScalarValue::Bool)
    }

    fn decode_float(row: &PgRow, idx: usize) -> ScalarValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(f64::from(v));
        }
        ScalarValue::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> ScalarValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map_or(ScalarValue::Null, |v| encode_binary(&v))
    }

    fn decode_json(row: &PgRow, idx: usize) -> ScalarValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map_or(ScalarValue::Null, |v| ScalarValue::Text(v.to_string()))
    }

    fn decode_text(row: &PgRow, idx: usize, type_name: &str) -> ScalarValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => text_or_null(v),
            // enums, citext and other text-like types
            Err(_) => match row.try_get_unchecked::<Option<String>, _>(idx) {
                Ok(v) => text_or_null(v),
                Err(_) => undecodable(type_name, idx),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8", DatabaseType::PostgreSQL), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT", DatabaseType::MySQL), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("DECIMAL", DatabaseType::MySQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC", DatabaseType::PostgreSQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMBER", DatabaseType::Oracle), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_temporal() {
        assert_eq!(categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("DATETIME", DatabaseType::MySQL), TypeCategory::Timestamp);
        assert_eq!(categorize_type("DATE", DatabaseType::PostgreSQL), TypeCategory::Date);
        assert_eq!(categorize_type("DATE", DatabaseType::Oracle), TypeCategory::Timestamp);
        assert_eq!(categorize_type("TIMESTAMP(6) WITH TIME ZONE", DatabaseType::Oracle), TypeCategory::TimestampTz);
    }

    #[test]
    fn test_categorize_other() {
        assert_eq!(categorize_type("jsonb", DatabaseType::PostgreSQL), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA", DatabaseType::PostgreSQL), TypeCategory::Binary);
        assert_eq!(categorize_type("VARCHAR", DatabaseType::MySQL), TypeCategory::Text);
        assert_eq!(categorize_type("BOOL", DatabaseType::PostgreSQL), TypeCategory::Boolean);
        assert_eq!(categorize_type("inet", DatabaseType::PostgreSQL), TypeCategory::Unknown);
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(encode_binary(b"hello world"), ScalarValue::Text("aGVsbG8gd29ybGQ=".into()));
        assert_eq!(encode_binary(&[0xFF, 0xFE, 0x00, 0x01]), ScalarValue::Text("//4AAQ==".into()));
        assert_eq!(encode_binary(&[]), ScalarValue::Text(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), ScalarValue::Float(1.5));
        assert_eq!(float_value(f64::NAN), ScalarValue::Text("NaN".into()));
        assert_eq!(float_value(f64::INFINITY), ScalarValue::Text("inf".into()));
    }
}
