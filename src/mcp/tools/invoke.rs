//! `invoke` MCP tool handler.
//!
//! Routes a task to the named agent's worker, spawning it on first use, and
//! returns the worker's result text. Pool failures become error results so
//! the client sees `Error: <message>` instead of a transport fault.

use rmcp::model::{CallToolResult, JsonObject};
use tracing::{info, info_span, warn, Instrument};

use crate::mcp::tools::util::{error_result, parse_args, text_result};
use crate::orchestrator::AgentPool;

/// Input parameters.
#[derive(Debug, serde::Deserialize)]
struct InvokeInput {
    /// Agent definition name.
    agent: String,
    /// Task text forwarded to the worker.
    task: String,
}

/// Handle the `invoke` tool call.
///
/// # Errors
///
/// Returns `invalid_params` if `agent` or `task` is missing.
pub async fn handle(
    pool: &AgentPool,
    args: Option<JsonObject>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let input: InvokeInput = parse_args("invoke", args)?;

    let span = info_span!("invoke", agent = %input.agent, task_len = input.task.len());
    async move {
        match pool.invoke(&input.agent, &input.task).await {
            Ok(text) => {
                info!(result_len = text.len(), "task completed");
                Ok(text_result(text))
            }
            Err(err) => {
                warn!(%err, "task failed");
                Ok(error_result(&err))
            }
        }
    }
    .instrument(span)
    .await
}
