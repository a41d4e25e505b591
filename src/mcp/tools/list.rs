//! `list` MCP tool handler.

use rmcp::model::CallToolResult;

use crate::mcp::tools::util::text_result;
use crate::orchestrator::AgentPool;

/// Handle the `list` tool call: live workers as a pretty JSON array.
///
/// # Errors
///
/// Returns `internal_error` if the snapshot cannot be serialized.
pub async fn handle(pool: &AgentPool) -> Result<CallToolResult, rmcp::ErrorData> {
    let workers = pool.list().await;
    let body = serde_json::to_string_pretty(&workers).map_err(|err| {
        rmcp::ErrorData::internal_error(format!("failed to serialize pool listing: {err}"), None)
    })?;
    Ok(text_result(body))
}
