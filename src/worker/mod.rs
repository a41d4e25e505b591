//! Worker process I/O and task correlation.
//!
//! A worker is an external process speaking newline-delimited JSON over its
//! stdio. Each worker owns:
//! - a writer task, the only owner of the worker's stdin,
//! - a reader task that frames stdout with [`codec::FrameCodec`] and feeds
//!   decoded frames to the [`correlator::Correlator`],
//! - supervision tasks that log stderr and watch for process exit.
//!
//! When any of these observes the worker going away it emits
//! [`WorkerEvent::Retired`] so the pool can drop the entry.

pub mod codec;
pub mod correlator;
pub mod frame;
pub mod handle;
pub mod reader;
pub mod spawner;
pub mod supervisor;
pub mod writer;

pub use handle::WorkerHandle;
pub use spawner::{Launcher, ProcessLauncher, WorkerIo};

/// Lifecycle notifications sent from worker tasks to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker's process exited or its streams failed.
    Retired {
        /// Agent the worker served.
        agent: String,
        /// Generation id of the retired worker.
        worker_id: u64,
        /// Human-readable reason.
        reason: String,
    },
}
