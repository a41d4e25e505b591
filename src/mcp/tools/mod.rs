//! MCP tool handlers.
//!
//! Each handler takes the pool and the raw call arguments so it can be
//! exercised without a live transport.

pub mod invoke;
pub mod list;
pub mod reset;
pub mod util;
pub mod warmup;
