//! `warmup` MCP tool handler.

use rmcp::model::{CallToolResult, JsonObject};
use tracing::{info_span, Instrument};

use crate::mcp::tools::util::{error_result, parse_args, text_result};
use crate::orchestrator::AgentPool;

/// Input parameters.
#[derive(Debug, serde::Deserialize)]
struct WarmupInput {
    /// Agent definition name.
    agent: String,
}

/// Handle the `warmup` tool call: spawn the worker without sending a task.
///
/// # Errors
///
/// Returns `invalid_params` if `agent` is missing.
pub async fn handle(
    pool: &AgentPool,
    args: Option<JsonObject>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let input: WarmupInput = parse_args("warmup", args)?;

    let span = info_span!("warmup", agent = %input.agent);
    async move {
        let result = match pool.warmup(&input.agent).await {
            Ok(Some(pid)) => text_result(format!(
                "Agent \"{}\" warmed up with PID {pid}",
                input.agent
            )),
            Ok(None) => text_result(format!("Agent \"{}\" warmed up", input.agent)),
            Err(err) => error_result(&err),
        };
        Ok(result)
    }
    .instrument(span)
    .await
}
