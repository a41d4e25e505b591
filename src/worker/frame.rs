//! Worker wire messages.
//!
//! Outbound (pool → worker):
//! `{"type":"user","message":{"role":"user","content":"..."}}`
//!
//! Inbound (worker → pool): any line. A JSON object with
//! `"type":"result"` and a non-null `result` completes the current task;
//! everything else is progress or noise.

use serde::Serialize;
use serde_json::Value;

use crate::{AppError, Result};

/// Content of the conversational reset command.
pub const RESET_COMMAND: &str = "/clear";

/// Decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Completion frame carrying the task result.
    Result {
        /// Result text.
        text: String,
        /// Worker-reported error flag (`is_error`), if any.
        is_error: bool,
    },
    /// Any other JSON object with a string `type`.
    Progress {
        /// Value of the `type` field.
        kind: String,
    },
    /// Not JSON, not an object, or no `type` discriminator.
    Unknown,
}

impl InboundFrame {
    /// Classify one line of worker output. Never fails.
    #[must_use]
    pub fn decode(line: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(line) else {
            return Self::Unknown;
        };

        let Some(kind) = object.get("type").and_then(Value::as_str) else {
            return Self::Unknown;
        };

        if kind == "result" {
            match object.get("result") {
                Some(Value::Null) | None => {}
                Some(Value::String(text)) => {
                    return Self::Result {
                        text: text.clone(),
                        is_error: is_error(&object),
                    };
                }
                Some(other) => {
                    return Self::Result {
                        text: other.to_string(),
                        is_error: is_error(&object),
                    };
                }
            }
        }

        Self::Progress {
            kind: kind.to_owned(),
        }
    }
}

fn is_error(object: &serde_json::Map<String, Value>) -> bool {
    object
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Message written to a worker's stdin.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    message: UserMessage,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct UserMessage {
    role: &'static str,
    content: String,
}

impl OutboundMessage {
    /// A user turn carrying `content`.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            kind: "user",
            message: UserMessage {
                role: "user",
                content: content.into(),
            },
        }
    }

    /// The conversational reset command.
    #[must_use]
    pub fn reset() -> Self {
        Self::user(RESET_COMMAND)
    }

    /// Message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// Whether this is the reset command.
    #[must_use]
    pub fn is_reset(&self) -> bool {
        self.message.content == RESET_COMMAND
    }

    /// Serialize to one compact JSON line without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| AppError::Protocol(format!("failed to serialise outbound message: {err}")))
    }
}
