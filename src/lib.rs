#![forbid(unsafe_code)]

//! Agent pool: long-lived agent worker processes behind an MCP server.
//!
//! Each named agent is backed by at most one worker subprocess that speaks
//! newline-delimited JSON over stdio. The worker is spawned with a prompt
//! composed from the agent's definition file and the skills and expertise
//! documents it references, reused across tasks, and given a context reset
//! after each one.

pub mod config;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod worker;

pub use config::PoolConfig;
pub use errors::{AppError, Result};
