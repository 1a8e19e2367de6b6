//! MCP (Model Context Protocol) server implementation

use async_trait::async_trait;
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ContentBlock, Implementation,
    InitializeResult, ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities,
    ServerCapabilitiesTools, TextContent, Tool, ToolInputSchema, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use govsql_workflow::{RunOutcome, Workflow};

const DEFAULT_HISTORY_RESULTS: usize = 5;

/// GovSQL MCP Server Handler
pub struct GovSqlServerHandler {
    workflow: Arc<Workflow>,
}

impl GovSqlServerHandler {
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self { workflow }
    }

    /// Create server initialization details
    pub fn server_info() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "govsql-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("GovSQL Natural Language to SQL Server".to_string()),
            },
            instructions: Some(
                "GovSQL Server - governed natural language to SQL. \
                 Use the 'text_to_sql' tool to run natural language database queries, \
                 'sql_history' to search past translations, and 'teach_sql' to store \
                 curated question/SQL pairs."
                    .to_string(),
            ),
            meta: None,
        }
    }

    fn string_prop(description: &str) -> Map<String, Value> {
        let mut prop = Map::new();
        prop.insert("type".to_string(), Value::String("string".to_string()));
        prop.insert(
            "description".to_string(),
            Value::String(description.to_string()),
        );
        prop
    }

    /// Define available MCP tools
    fn tools() -> Vec<Tool> {
        let mut tools = Vec::new();

        // Text-to-SQL tool
        {
            let mut properties = HashMap::new();
            properties.insert(
                "question".to_string(),
                Self::string_prop("Natural language question to answer from the database"),
            );
            properties.insert(
                "db_schema".to_string(),
                Self::string_prop("Database schema the question refers to"),
            );

            tools.push(Tool {
                name: "text_to_sql".to_string(),
                description: Some(
                    "Translates human questions / natural language questions into SQL \
                     statements and executes them against the database. ALWAYS use this \
                     tool for translation of natural language questions into SQL. The tool \
                     retrieves the metadata of the requested schema on its own."
                        .to_string(),
                ),
                input_schema: ToolInputSchema::new(
                    vec!["question".to_string(), "db_schema".to_string()],
                    Some(properties),
                ),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            });
        }

        // History search tool
        {
            let mut properties = HashMap::new();
            properties.insert(
                "search_text".to_string(),
                Self::string_prop("Phrase to search the SQL history with"),
            );
            properties.insert(
                "db_schema".to_string(),
                Self::string_prop("Database schema whose history is searched"),
            );
            let mut number_prop = Map::new();
            number_prop.insert("type".to_string(), Value::String("integer".to_string()));
            number_prop.insert(
                "description".to_string(),
                Value::String("Maximum number of results (defaults to 5)".to_string()),
            );
            properties.insert("number_results".to_string(), number_prop);

            tools.push(Tool {
                name: "sql_history".to_string(),
                description: Some(
                    "Returns SQL queries and the corresponding questions for the requested \
                     database schema. Results are ranked by semantic distance to the search \
                     phrase."
                        .to_string(),
                ),
                input_schema: ToolInputSchema::new(
                    vec!["search_text".to_string(), "db_schema".to_string()],
                    Some(properties),
                ),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            });
        }

        // Teach tool
        {
            let mut properties = HashMap::new();
            properties.insert(
                "question".to_string(),
                Self::string_prop("Natural language question to store"),
            );
            properties.insert(
                "sql_statement".to_string(),
                Self::string_prop("SQL statement answering the question"),
            );
            properties.insert(
                "db_schema".to_string(),
                Self::string_prop("Database schema the pair belongs to"),
            );

            tools.push(Tool {
                name: "teach_sql".to_string(),
                description: Some(
                    "Stores a combination of a natural language question and its \
                     corresponding SQL statement into the similarity history. It does not \
                     execute a query or answer a question."
                        .to_string(),
                ),
                input_schema: ToolInputSchema::new(
                    vec![
                        "question".to_string(),
                        "sql_statement".to_string(),
                        "db_schema".to_string(),
                    ],
                    Some(properties),
                ),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            });
        }

        tools
    }

    fn text_result(text: String) -> CallToolResult {
        CallToolResult {
            content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
            is_error: None,
            meta: None,
            structured_content: None,
        }
    }

    fn required_str<'a>(
        args: &'a serde_json::Value,
        name: &str,
    ) -> Result<&'a str, CallToolError> {
        args.get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| CallToolError::from_message(format!("Missing required argument: {}", name)))
    }
}

#[async_trait]
impl ServerHandler for GovSqlServerHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        info!("Listing available tools");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        info!("Tool called: {}", request.params.name);

        let arguments = request
            .params
            .arguments
            .map(serde_json::Value::Object)
            .ok_or_else(|| CallToolError::from_message("Missing arguments"))?;

        match request.params.name.as_str() {
            "text_to_sql" => self.handle_text_to_sql(&arguments).await,
            "sql_history" => self.handle_sql_history(&arguments).await,
            "teach_sql" => self.handle_teach_sql(&arguments).await,
            _ => Err(CallToolError::unknown_tool(request.params.name.clone())),
        }
    }
}

impl GovSqlServerHandler {
    async fn handle_text_to_sql(
        &self,
        args: &serde_json::Value,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let question = Self::required_str(args, "question")?;
        let db_schema = Self::required_str(args, "db_schema")?;

        info!(schema = db_schema, "Executing text-to-sql: {}", question);

        let outcome = self
            .workflow
            .translate_and_execute(question, db_schema)
            .await
            .map_err(|e| {
                error!("Translation run aborted: {}", e);
                CallToolError::from_message(format!("Translation run aborted: {}", e))
            })?;

        let text = match outcome {
            RunOutcome::Answer {
                rendered_result, ..
            } => rendered_result,
            RunOutcome::NotRelevant { info_message }
            | RunOutcome::StatementNotAllowed { info_message }
            | RunOutcome::TranslationExhausted { info_message } => info_message,
        };

        Ok(Self::text_result(text))
    }

    async fn handle_sql_history(
        &self,
        args: &serde_json::Value,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let search_text = Self::required_str(args, "search_text")?;
        let db_schema = Self::required_str(args, "db_schema")?;
        let limit = args
            .get("number_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_HISTORY_RESULTS as u64) as usize;

        info!(schema = db_schema, "Searching SQL history: {}", search_text);

        let matches = self
            .workflow
            .search_history(search_text, db_schema, limit)
            .await
            .map_err(|e| {
                error!("History search failed: {}", e);
                CallToolError::from_message(format!("History search failed: {}", e))
            })?;

        let text = serde_json::to_string_pretty(&matches).unwrap_or_default();
        Ok(Self::text_result(text))
    }

    async fn handle_teach_sql(
        &self,
        args: &serde_json::Value,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let question = Self::required_str(args, "question")?;
        let sql_statement = Self::required_str(args, "sql_statement")?;
        let db_schema = Self::required_str(args, "db_schema")?;

        info!(schema = db_schema, "Teaching question/SQL pair");

        let confirmation = self
            .workflow
            .teach(question, sql_statement, db_schema)
            .await
            .map_err(|e| {
                error!("Teach failed: {}", e);
                CallToolError::from_message(format!("Teach failed: {}", e))
            })?;

        Ok(Self::text_result(confirmation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_are_registered_with_required_arguments() {
        let tools = GovSqlServerHandler::tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["text_to_sql", "sql_history", "teach_sql"]);

        let required: Vec<Vec<String>> = tools
            .iter()
            .map(|t| {
                let schema = serde_json::to_value(&t.input_schema).unwrap();
                serde_json::from_value(schema["required"].clone()).unwrap()
            })
            .collect();
        assert!(required[0].contains(&"question".to_string()));
        assert!(required[1].contains(&"search_text".to_string()));
        assert!(required[2].contains(&"sql_statement".to_string()));
    }
}
