//! Worker lifecycle state machine and list snapshots.

use serde::Serialize;

/// Lifecycle state of a pooled worker process.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Process launched; no task dispatched yet.
    Starting,
    /// Idle and able to accept a task.
    Ready,
    /// A task is in flight.
    Busy,
    /// Eviction requested; waiting for the process to go away.
    Terminating,
    /// Process exited or its streams failed.
    Dead,
}

/// External signal driving a [`WorkerState`] transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// A task was written to the worker.
    Dispatched,
    /// The completion frame for the in-flight task arrived.
    Completed,
    /// The in-flight task passed its deadline.
    TimedOut,
    /// The pool asked the worker to terminate.
    TerminateRequested,
    /// The process exited, or its output stream closed or errored.
    Closed,
}

impl WorkerState {
    /// Compute the state reached from `self` on `signal`.
    ///
    /// Pairs without a defined transition leave the state unchanged.
    /// `Dead` is absorbing.
    #[must_use]
    pub fn next(self, signal: WorkerSignal) -> Self {
        match (self, signal) {
            (Self::Dead, _) | (_, WorkerSignal::Closed) => Self::Dead,
            (Self::Starting | Self::Ready, WorkerSignal::Dispatched) => Self::Busy,
            (Self::Busy, WorkerSignal::Completed | WorkerSignal::TimedOut) => Self::Ready,
            (Self::Starting | Self::Ready | Self::Busy, WorkerSignal::TerminateRequested) => {
                Self::Terminating
            }
            (state, _) => state,
        }
    }

    /// Whether a task may be dispatched in this state.
    #[must_use]
    pub fn accepts_task(self) -> bool {
        matches!(self, Self::Starting | Self::Ready)
    }

    /// Whether the worker still counts as a pool member.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Ready | Self::Busy)
    }
}

/// Snapshot of one pooled worker, as returned by `list`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Agent name the worker serves.
    pub name: String,
    /// OS process id, when the worker is a real process.
    pub pid: Option<u32>,
    /// Lifecycle state at snapshot time.
    pub state: WorkerState,
}
