//! `reset` MCP tool handler.
//!
//! Evicts the agent's worker so the next invocation starts from a fresh
//! process with a freshly composed prompt.

use rmcp::model::{CallToolResult, JsonObject};
use tracing::info;

use crate::mcp::tools::util::{parse_args, text_result};
use crate::orchestrator::AgentPool;

/// Input parameters.
#[derive(Debug, serde::Deserialize)]
struct ResetInput {
    /// Agent definition name.
    agent: String,
}

/// Handle the `reset` tool call.
///
/// # Errors
///
/// Returns `invalid_params` if `agent` is missing.
pub async fn handle(
    pool: &AgentPool,
    args: Option<JsonObject>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let input: ResetInput = parse_args("reset", args)?;

    let text = if pool.evict(&input.agent).await {
        info!(agent = %input.agent, "agent reset");
        format!("Agent \"{}\" has been reset", input.agent)
    } else {
        format!("Agent \"{}\" not found in pool", input.agent)
    };
    Ok(text_result(text))
}
