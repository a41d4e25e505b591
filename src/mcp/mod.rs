//! Model Context Protocol server layer.
//!
//! Exposes the agent pool to an MCP client over stdio as four tools:
//! `invoke`, `list`, `reset` and `warmup`.

pub mod handler;
pub mod tools;
pub mod transport;
