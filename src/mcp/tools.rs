//! MCP Tools Implementation
//!
//! Catalog search tools exposed over MCP, each backed by the shared [`CatalogService`].

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::service::{CatalogService, ErrorBody, ResponseStatus};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const INTERNAL_REFRESH_FAILURE: &str = "An internal error occurred while refreshing the index";

/// Ranks catalog tables against a natural-language query
pub struct SearchTablesHandler {
    service: Arc<CatalogService>,
}

/// Rebuilds or reloads the index for a metadata file when it changed
pub struct RefreshIndexHandler {
    service: Arc<CatalogService>,
}

/// Reports which source is active and how the index was obtained
pub struct IndexStatusHandler {
    service: Arc<CatalogService>,
}

#[derive(Debug, Serialize)]
struct ToolFailure {
    status: ResponseStatus,
    error: ErrorBody,
}

/// Register every catalog tool on `server`
#[inline]
pub async fn register_catalog_tools(server: &McpServer, service: &Arc<CatalogService>) {
    server
        .register_tool(
            SearchTablesHandler::tool_definition(),
            SearchTablesHandler::new(Arc::clone(service)),
        )
        .await;
    server
        .register_tool(
            RefreshIndexHandler::tool_definition(),
            RefreshIndexHandler::new(Arc::clone(service)),
        )
        .await;
    server
        .register_tool(
            IndexStatusHandler::tool_definition(),
            IndexStatusHandler::new(Arc::clone(service)),
        )
        .await;
}

impl SearchTablesHandler {
    #[inline]
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search_tables".to_string(),
            description: Some("Find catalog tables relevant to a natural-language query".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Question or table name to search for"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchTablesHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidToolParameters {
                tool: "search_tables".to_string(),
                message: "Missing required parameter: query".to_string(),
            })?;

        debug!("search_tables: query={:?}", query);
        let response = self.service.search(query).await;
        let is_error = response.status == ResponseStatus::Error;
        json_result(&response, is_error)
    }
}

impl RefreshIndexHandler {
    #[inline]
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "refresh_index".to_string(),
            description: Some(
                "Bring the search index up to date with a catalog metadata file".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "metadata_path": {
                        "type": "string",
                        "description": "Optional: metadata file to index (default: the configured file)"
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for RefreshIndexHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let metadata_path = optional_path(&args, "metadata_path")?;

        debug!("refresh_index: metadata_path={:?}", metadata_path);
        match self.service.refresh(metadata_path.as_deref()).await {
            Ok(outcome) => json_result(&outcome, false),
            Err(e) => json_result(
                &ToolFailure {
                    status: ResponseStatus::Error,
                    error: ErrorBody::from_error(&e, INTERNAL_REFRESH_FAILURE),
                },
                true,
            ),
        }
    }
}

impl IndexStatusHandler {
    #[inline]
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "index_status".to_string(),
            description: Some("Show the active catalog source and index state".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for IndexStatusHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> McpResult<CallToolResult> {
        json_result(&self.service.status().await, false)
    }
}

fn optional_path(args: &HashMap<String, Value>, name: &str) -> McpResult<Option<PathBuf>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(path)) if !path.trim().is_empty() => Ok(Some(PathBuf::from(path))),
        Some(_) => Err(McpError::InvalidToolParameters {
            tool: "refresh_index".to_string(),
            message: format!("{} must be a non-empty string", name),
        }),
    }
}

fn json_result<T: Serialize>(body: &T, is_error: bool) -> McpResult<CallToolResult> {
    CallToolResult::json(body, is_error).map_err(|e| McpError::InternalError {
        message: format!("Failed to encode tool result: {}", e),
    })
}
