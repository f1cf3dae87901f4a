//! Schema-related data models.
//!
//! Catalog queries for every engine project the same column order, so each
//! entry type here is built from a positional row of [`ScalarValue`]s.

use crate::models::ScalarValue;
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableType {
    Table,
    View,
    Other,
}

impl TableType {
    /// Parse the catalog's table type string.
    pub fn from_catalog(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "BASE TABLE" | "TABLE" => Self::Table,
            "VIEW" | "SYSTEM VIEW" | "MATERIALIZED VIEW" => Self::View,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "TABLE"),
            Self::View => write!(f, "VIEW"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

fn text_at(row: &[ScalarValue], idx: usize) -> Option<String> {
    row.get(idx).and_then(ScalarValue::as_text)
}

/// `(table_schema, table_name, table_type)`
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TableEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: TableType,
}

impl TableEntry {
    pub fn from_row(row: &[ScalarValue]) -> Option<Self> {
        Some(Self {
            schema: text_at(row, 0),
            name: text_at(row, 1)?,
            table_type: text_at(row, 2)
                .map(|t| TableType::from_catalog(&t))
                .unwrap_or(TableType::Other),
        })
    }
}

/// `(table_name, column_name, data_type, is_nullable, column_default, ordinal_position)`
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnEntry {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub ordinal: i64,
}

impl ColumnEntry {
    /// Parse a column row, returning the owning table name alongside.
    pub fn from_row(row: &[ScalarValue]) -> Option<(String, Self)> {
        let table = text_at(row, 0)?;
        let nullable = text_at(row, 3)
            .map(|v| matches!(v.trim().to_ascii_uppercase().as_str(), "YES" | "Y"))
            .unwrap_or(true);
        let column = Self {
            name: text_at(row, 1)?,
            data_type: text_at(row, 2).unwrap_or_default(),
            nullable,
            default: text_at(row, 4).map(|d| d.trim().to_string()),
            ordinal: row.get(5).and_then(ScalarValue::as_i64).unwrap_or_default(),
        };
        Some((table, column))
    }
}

/// A table with its columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnEntry>,
}

/// `(view_schema, view_name, view_definition)`
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ViewEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl ViewEntry {
    pub fn from_row(row: &[ScalarValue]) -> Option<Self> {
        Some(Self {
            schema: text_at(row, 0),
            name: text_at(row, 1)?,
            definition: text_at(row, 2),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutineType {
    Procedure,
    Function,
}

/// `(routine_schema, routine_name, routine_type)`
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RoutineEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(skip)]
    pub routine_type: Option<RoutineType>,
}

impl RoutineEntry {
    pub fn from_row(row: &[ScalarValue]) -> Option<Self> {
        let routine_type = match text_at(row, 2)?.trim().to_ascii_uppercase().as_str() {
            "PROCEDURE" => Some(RoutineType::Procedure),
            "FUNCTION" => Some(RoutineType::Function),
            _ => None,
        };
        Some(Self {
            schema: text_at(row, 0),
            name: text_at(row, 1)?,
            routine_type,
        })
    }
}

/// Group column rows into tables, preserving first-seen table order.
pub fn group_columns(rows: &[Vec<ScalarValue>]) -> Vec<TableDescription> {
    let mut tables: Vec<TableDescription> = Vec::new();
    for (table, column) in rows.iter().filter_map(|r| ColumnEntry::from_row(r)) {
        match tables.iter_mut().find(|t| t.name == table) {
            Some(existing) => existing.columns.push(column),
            None => tables.push(TableDescription {
                name: table,
                columns: vec![column],
            }),
        }
    }
    tables
}
