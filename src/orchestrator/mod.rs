//! Agent pool orchestration.
//!
//! Owns the registry of live workers and the operations exposed to callers:
//! invoke, list, reset (evict) and warmup.

pub mod pool;

pub use pool::AgentPool;
