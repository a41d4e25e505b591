//! MCP server handler and tool catalogue.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::{info_span, Instrument};

use crate::mcp::tools;
use crate::orchestrator::AgentPool;

/// Instructions advertised to MCP clients.
const INSTRUCTIONS: &str = "Routes tasks to long-lived agent workers. Use `invoke` to run a task \
     on a named agent, `list` to inspect live workers, `reset` to discard an agent's worker, \
     and `warmup` to start a worker ahead of its first task.";

/// MCP server exposing the agent pool tools.
#[derive(Debug, Clone)]
pub struct AgentPoolServer {
    pool: AgentPool,
}

impl AgentPoolServer {
    /// Create a server bound to `pool`.
    #[must_use]
    pub fn new(pool: AgentPool) -> Self {
        Self { pool }
    }

    /// Dispatch a tool call by name.
    ///
    /// # Errors
    ///
    /// Returns `invalid_params` for an unknown tool or malformed arguments.
    pub async fn dispatch(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let CallToolRequestParam {
            name, arguments, ..
        } = request;
        let args = arguments;
        match &*name {
            "invoke" => tools::invoke::handle(&self.pool, args).await,
            "list" => tools::list::handle(&self.pool).await,
            "reset" => tools::reset::handle(&self.pool, args).await,
            "warmup" => tools::warmup::handle(&self.pool, args).await,
            other => Err(rmcp::ErrorData::invalid_params(
                format!("unknown tool: {other}"),
                None,
            )),
        }
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    /// Every tool this server exposes.
    #[must_use]
    pub fn all_tools() -> Vec<Tool> {
        let agent_only = || {
            Self::schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "agent": { "type": "string", "description": "Agent definition name" }
                },
                "required": ["agent"]
            }))
        };

        vec![
            Tool::new(
                "invoke",
                "Run a task on the named agent. The agent's worker is started on first use \
                 and reused afterwards; its context is cleared after every task.",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "agent": { "type": "string", "description": "Agent definition name" },
                        "task": { "type": "string", "description": "Task text for the agent" }
                    },
                    "required": ["agent", "task"]
                })),
            ),
            Tool::new(
                "list",
                "List live agent workers with their process id and state.",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {}
                })),
            ),
            Tool::new(
                "reset",
                "Terminate the named agent's worker. The next invocation starts a fresh one.",
                agent_only(),
            ),
            Tool::new(
                "warmup",
                "Start the named agent's worker ahead of its first task.",
                agent_only(),
            ),
        ]
    }
}

impl ServerHandler for AgentPoolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_owned()),
            ..Default::default()
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let span = info_span!("call_tool", tool = %request.name);
        self.dispatch(request).instrument(span)
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::all_tools())))
    }
}
