//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all pool failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A name or path resolved outside its trusted root.
    PathTraversal(String),
    /// The agent definition file does not exist under the agents root.
    DefinitionNotFound(String),
    /// The agent definition's front matter is not valid YAML.
    InvalidDefinition(String),
    /// The task did not complete before its deadline (milliseconds).
    TaskTimeout(u64),
    /// The worker's stream closed, or the worker was evicted, while a task was pending.
    WorkerClosed(String),
    /// The operating system refused to start the worker process.
    Spawn(String),
    /// A single inbound line could not be framed (too long, not UTF-8).
    Protocol(String),
    /// MCP transport failure.
    Mcp(String),
    /// File-system or stream I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::PathTraversal(msg) => write!(f, "path traversal: {msg}"),
            Self::DefinitionNotFound(msg) => write!(f, "agent not found: {msg}"),
            Self::InvalidDefinition(msg) => write!(f, "invalid definition: {msg}"),
            Self::TaskTimeout(ms) => write!(f, "task timeout after {ms}ms"),
            Self::WorkerClosed(msg) => write!(f, "worker closed unexpectedly: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Mcp(msg) => write!(f, "mcp: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
