//! Shared utilities for MCP tool handlers.

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::de::DeserializeOwned;

/// Deserialize tool arguments into `T`.
///
/// A missing argument object is treated as empty.
///
/// # Errors
///
/// Returns `invalid_params` naming `tool` when the arguments do not match.
pub fn parse_args<T: DeserializeOwned>(
    tool: &str,
    args: Option<JsonObject>,
) -> Result<T, rmcp::ErrorData> {
    let args = args.unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(args)).map_err(|err| {
        rmcp::ErrorData::invalid_params(format!("invalid {tool} parameters: {err}"), None)
    })
}

/// Successful result carrying a single text block.
#[must_use]
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Error result shown to the caller as `Error: <message>`.
#[must_use]
pub fn error_result(err: &impl std::fmt::Display) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("Error: {err}"))])
}
