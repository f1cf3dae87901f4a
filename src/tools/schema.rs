//! Schema introspection tools.
//!
//! This module implements the `db_schema` and `db_list_tables` MCP tools.
//! Catalog queries are READ statements by construction; they still go
//! through the policy so the statement timeout applies.

use crate::db::{Connection, Connector, Dialect};
use crate::error::{DbError, DbResult};
use crate::models::{
    DatabaseType, DbConfig, RoutineEntry, RoutineType, TableDescription, TableEntry, ViewEntry,
    group_columns,
};
use crate::safety::{RiskTier, decide};
use crate::tools::ToolContext;
use crate::tools::connection::{ConnectionInput, require_config};
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on rows read from any single catalog query.
const CATALOG_ROW_CAP: usize = 100_000;

/// Input for the schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaInput {
    /// Target database connection settings
    #[serde(default)]
    pub config: Option<ConnectionInput>,
    /// Describe only this table. Omit for a full catalog snapshot.
    #[serde(default)]
    pub table: Option<String>,
    /// Schema (PostgreSQL), database (MySQL) or owner (Oracle). Defaults to the connection's.
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from the schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SchemaOutput {
    pub engine: DatabaseType,
    pub tables: Vec<TableDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<ViewEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedures: Option<Vec<RoutineEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<RoutineEntry>>,
}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Target database connection settings
    #[serde(default)]
    pub config: Option<ConnectionInput>,
    /// Schema (PostgreSQL), database (MySQL) or owner (Oracle) to list
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    pub tables: Vec<TableEntry>,
    pub count: usize,
}

/// Handler for `db_schema` and `db_list_tables`.
pub struct SchemaToolHandler<C: Connector> {
    ctx: Arc<ToolContext<C>>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<C: Connector> SchemaToolHandler<C> {
    pub fn new(ctx: Arc<ToolContext<C>>) -> Self {
        Self { ctx }
    }

    fn read_timeout(&self) -> DbResult<Duration> {
        let decision = decide(RiskTier::Read, self.ctx.policy()).into_result()?;
        let secs = decision
            .timeout_seconds
            .unwrap_or_else(|| self.ctx.policy().timeout_seconds());
        Ok(Duration::from_secs(u64::from(secs)))
    }

    /// List tables and views, optionally within one schema.
    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let config = require_config(&input.config)?;
        let dialect = Dialect::for_config(&config);
        let schema = non_blank(input.schema.as_deref()).or_else(|| config.schema.clone());
        let stmt = dialect.list_tables_query(schema.as_deref());
        debug!(sql = %stmt.sql, "Listing tables");

        let fetched = self
            .ctx
            .manager()
            .with_connection(&config, &dialect, self.read_timeout()?, move |conn| {
                async move { conn.fetch(&stmt, CATALOG_ROW_CAP).await }.boxed()
            })
            .await?;

        let tables: Vec<TableEntry> = fetched
            .rows
            .iter()
            .filter_map(|row| TableEntry::from_row(row))
            .collect();
        info!(engine = %config.db_type, count = tables.len(), "Listed tables");
        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }

    /// Describe one table, or snapshot the catalog when no table is given.
    pub async fn describe(&self, input: SchemaInput) -> DbResult<SchemaOutput> {
        let config = require_config(&input.config)?;
        let table = match input.table.as_deref() {
            Some(t) if t.trim().is_empty() => {
                return Err(DbError::bad_request("table name must not be empty"));
            }
            other => non_blank(other),
        };
        let schema = non_blank(input.schema.as_deref()).or_else(|| config.schema.clone());
        let dialect = Dialect::for_config(&config);
        let timeout = self.read_timeout()?;

        match table {
            Some(table) => self.describe_table(&config, &dialect, table, schema, timeout).await,
            None => self.snapshot(&config, &dialect, schema, timeout).await,
        }
    }

    async fn describe_table(
        &self,
        config: &DbConfig,
        dialect: &Dialect,
        table: String,
        schema: Option<String>,
        timeout: Duration,
    ) -> DbResult<SchemaOutput> {
        let stmt = dialect.describe_columns_query(Some(&table), schema.as_deref());
        debug!(sql = %stmt.sql, table = %table, "Describing table");

        let fetched = self
            .ctx
            .manager()
            .with_connection(config, dialect, timeout, move |conn| {
                async move { conn.fetch(&stmt, CATALOG_ROW_CAP).await }.boxed()
            })
            .await?;

        let tables = group_columns(&fetched.rows);
        if tables.is_empty() {
            return Err(DbError::not_found(format!("table '{}' not found", table)));
        }
        info!(engine = %config.db_type, table = %table, "Described table");
        Ok(SchemaOutput {
            engine: config.db_type,
            tables,
            views: None,
            procedures: None,
            functions: None,
        })
    }

    async fn snapshot(
        &self,
        config: &DbConfig,
        dialect: &Dialect,
        schema: Option<String>,
        timeout: Duration,
    ) -> DbResult<SchemaOutput> {
        let schema = schema.as_deref();
        let statements = [
            dialect.describe_columns_query(None, schema),
            dialect.list_views_query(schema),
            dialect.list_routines_query(schema),
        ];

        let [columns, views, routines] = self
            .ctx
            .manager()
            .with_connection(config, dialect, timeout, move |conn| {
                async move {
                    let [columns, views, routines] = &statements;
                    Ok([
                        conn.fetch(columns, CATALOG_ROW_CAP).await?,
                        conn.fetch(views, CATALOG_ROW_CAP).await?,
                        conn.fetch(routines, CATALOG_ROW_CAP).await?,
                    ])
                }
                .boxed()
            })
            .await?;

        let tables = group_columns(&columns.rows);
        let views: Vec<ViewEntry> = views
            .rows
            .iter()
            .filter_map(|row| ViewEntry::from_row(row))
            .collect();
        let (procedures, functions): (Vec<RoutineEntry>, Vec<RoutineEntry>) = routines
            .rows
            .iter()
            .filter_map(|row| RoutineEntry::from_row(row))
            .partition(|r| r.routine_type == Some(RoutineType::Procedure));

        info!(
            engine = %config.db_type,
            tables = tables.len(),
            views = views.len(),
            procedures = procedures.len(),
            functions = functions.len(),
            "Catalog snapshot complete"
        );
        Ok(SchemaOutput {
            engine: config.db_type,
            tables,
            views: Some(views),
            procedures: Some(procedures),
            functions: Some(
                functions
                    .into_iter()
                    .filter(|r| r.routine_type == Some(RoutineType::Function))
                    .collect(),
            ),
        })
    }
}
