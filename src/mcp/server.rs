use std::sync::Arc;

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
        PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool as McpTool,
    },
    service::{RequestContext, RoleServer, ServiceExt},
    ErrorData as McpError, ServerHandler,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::tools::executor::ToolExecutor;

const INSTRUCTIONS: &str = "Read access to a locally stored message history (contacts, chats, messages) \
and the ability to send text messages. Message times are UTC. Listings are paginated with limit and a zero-based page.";

/// Serves the tool registry over MCP. Every call is stateless; the executor
/// owns all shared state.
#[derive(Clone)]
pub struct BridgeServer {
    executor: Arc<ToolExecutor>,
}

impl BridgeServer {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }

    pub fn tools(&self) -> Vec<McpTool> {
        self.executor
            .registry()
            .list_tools()
            .iter()
            .map(|tool| {
                let schema = match tool.parameters_schema() {
                    Value::Object(map) => map,
                    _ => JsonObject::new(),
                };
                McpTool::new(
                    tool.name().to_string(),
                    tool.description().to_string(),
                    Arc::new(schema),
                )
            })
            .collect()
    }

    /// Tool failures become error results rather than protocol errors so the
    /// caller sees the cause.
    pub async fn call(&self, name: &str, arguments: Option<JsonObject>) -> CallToolResult {
        let params = arguments.map(Value::Object).unwrap_or(Value::Null);
        match self.executor.execute(name, params).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                CallToolResult::success(vec![Content::text(text)])
            }
            Err(e) => CallToolResult::error(vec![Content::text(format!("{:#}", e))]),
        }
    }
}

impl ServerHandler for BridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        debug!("MCP server: call_tool {}", request.name);
        Ok(self.call(&request.name, request.arguments).await)
    }
}

/// Runs the server on stdin/stdout until the client disconnects.
pub async fn serve_stdio(server: BridgeServer) -> anyhow::Result<()> {
    info!("MCP server: serving {} tools on stdio", server.tools().len());
    let running = server.serve(rmcp::transport::stdio()).await?;
    let reason = running.waiting().await?;
    info!("MCP server: stopped ({:?})", reason);
    Ok(())
}
