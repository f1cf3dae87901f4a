//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with the five database tools
//! exposed via the MCP protocol using the rmcp framework's macros. Every
//! tool call carries its own connection description; nothing is cached.

use crate::db::DriverConnector;
use crate::tools::{
    ConnectionToolHandler, ListTablesInput, ListTablesOutput, QueryInput, QueryOutput,
    QueryToolHandler, SchemaInput, SchemaOutput, SchemaToolHandler, TestConnectionInput,
    TestConnectionOutput, ToolContext, ValidateInput, ValidateOutput, ValidateToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct DbService {
    /// Connection manager and policy shared by all tool calls
    ctx: Arc<ToolContext<DriverConnector>>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    pub fn new(ctx: Arc<ToolContext<DriverConnector>>) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    pub fn context(&self) -> &ToolContext<DriverConnector> {
        &self.ctx
    }
}

#[tool_router]
impl DbService {
    #[tool(
        name = "db_test_connection",
        description = "Open a connection, run a trivial probe and close it.\nReports success with the engine and elapsed time, or a structured error. Never returns rows."
    )]
    async fn test_connection(
        &self,
        Parameters(input): Parameters<TestConnectionInput>,
    ) -> Result<Json<TestConnectionOutput>, McpError> {
        let handler = ConnectionToolHandler::new(self.ctx.clone());
        handler
            .test_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        name = "db_validate",
        description = "Classify a SQL statement by risk tier (READ, READ_WITH_SIDE_EFFECTS, WRITE, SCHEMA_CHANGE, ADMIN, UNRECOGNIZED) and report the policy decision without executing it.\nNo connection is opened unless check_syntax is true and the statement is allowed; then it is EXPLAINed, never run."
    )]
    async fn validate(
        &self,
        Parameters(input): Parameters<ValidateInput>,
    ) -> Result<Json<ValidateOutput>, McpError> {
        let handler = ValidateToolHandler::new(self.ctx.clone());
        handler
            .validate(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        name = "db_schema",
        description = "Describe the database catalog.\nWith `table`: that table's columns. Without: tables with columns, views, procedures and functions.\nOptional `schema` narrows the scope."
    )]
    async fn schema(
        &self,
        Parameters(input): Parameters<SchemaInput>,
    ) -> Result<Json<SchemaOutput>, McpError> {
        let handler = SchemaToolHandler::new(self.ctx.clone());
        handler.describe(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        name = "db_list_tables",
        description = "List tables and views.\nOptional `schema` selects the PostgreSQL schema, MySQL database or Oracle owner."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        let handler = SchemaToolHandler::new(self.ctx.clone());
        handler
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        name = "db_query",
        description = "Execute a SQL statement that the policy allows and return columns and rows.\nReads are bounded by the row limit; `truncated` marks results cut short.\nUse %(name)s placeholders with `params`. `max_rows` and `timeout` can only lower the server limits."
    )]
    async fn query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryOutput>, McpError> {
        let handler = QueryToolHandler::new(self.ctx.clone());
        handler.query(input).await.map(Json).map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        let policy = self.ctx.policy();
        let writes = if policy.allow_writes {
            "WRITE statements are enabled by the operator."
        } else {
            "WRITE statements are disabled."
        };
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                title: Some("DB Steward MCP".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Safe access to PostgreSQL, MySQL and Oracle databases.\n\
                \n\
                ## Workflow\n\
                1. Pass a `config` object (engine, host, port, database, user, password, ssl_mode) with every call\n\
                2. Call `db_test_connection` to check reachability\n\
                3. Explore with `db_list_tables` and `db_schema`\n\
                4. Preview a statement with `db_validate`, then run it with `db_query`\n\
                \n\
                ## Policy\n\
                - READ statements run with a row limit of {}\n\
                - {}\n\
                - Schema changes, admin statements and anything not recognized are always denied\n\
                - Denials carry the risk tier and, where one exists, the configuration change that would allow it",
                policy.default_row_limit, writes
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConnectionManager;
    use crate::safety::PolicyConfig;

    fn create_test_service(policy: PolicyConfig) -> DbService {
        let manager = ConnectionManager::new(DriverConnector::default());
        DbService::new(Arc::new(ToolContext::new(manager, policy)))
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service(PolicyConfig::default());
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-steward-mcp");
        assert!(info.capabilities.tools.is_some());
        let instructions = info.instructions.unwrap();
        assert!(instructions.contains("row limit of 100"));
        assert!(instructions.contains("WRITE statements are disabled"));
    }

    #[test]
    fn test_all_tools_registered() {
        let service = create_test_service(PolicyConfig::default());
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "db_list_tables",
                "db_query",
                "db_schema",
                "db_test_connection",
                "db_validate"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_config_is_invalid_params() {
        let service = create_test_service(PolicyConfig::default());
        let input: QueryInput = serde_json::from_str(r#"{"sql": "SELECT 1"}"#).unwrap();
        let result = service.query(Parameters(input)).await;
        assert!(matches!(
            result,
            Err(ref e) if e.code == rmcp::model::ErrorCode::INVALID_PARAMS
        ));
    }

    #[test]
    fn test_context_carries_policy() {
        let policy = PolicyConfig {
            allow_writes: true,
            ..PolicyConfig::default()
        };
        let service = create_test_service(policy);
        assert!(service.context().policy().allow_writes);
        assert!(
            service
                .get_info()
                .instructions
                .unwrap()
                .contains("enabled by the operator")
        );
    }
}
