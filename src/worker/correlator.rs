//! Pending-task bookkeeping for one worker.
//!
//! The correlator pairs completion frames with the single in-flight task and
//! drives the worker's [`WorkerState`]. It performs no I/O: callers feed it
//! frames and deadlines and act on what it returns, which keeps it testable
//! without a process.
//!
//! A timed-out task leaves the worker owing one completion frame. The next
//! completion frame is absorbed against that debt instead of resolving a
//! newer task, so a late answer is never delivered to the wrong caller.
//!
//! The debt assumes the worker answers every task in order. If a task that
//! absorbed a frame as debt then times out itself, the absorbed frame was
//! its own answer and the earlier reply was dropped, so the debt is
//! cleared instead of growing and the worker recovers on the next task.

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::worker::{WorkerSignal, WorkerState};
use crate::worker::frame::InboundFrame;
use crate::{AppError, Result};

/// Outcome delivered to a waiting task.
pub type TaskOutcome = Result<String>;

/// The task currently awaiting its completion frame.
#[derive(Debug)]
pub struct PendingTask {
    /// Task sequence number, unique per worker.
    pub id: u64,
    /// Instant after which the task times out.
    pub deadline: Instant,
    /// Whether a completion frame was absorbed as debt while this task was pending.
    pub absorbed_late: bool,
    resolver: oneshot::Sender<TaskOutcome>,
}

/// Receiving side of a dispatched task.
#[derive(Debug)]
pub struct Dispatch {
    /// Task sequence number.
    pub task_id: u64,
    /// Instant after which the task times out.
    pub deadline: Instant,
    /// Resolves with the task outcome.
    pub receiver: oneshot::Receiver<TaskOutcome>,
}

/// A completion taken from the correlator but not yet delivered.
///
/// Delivery is split from matching so the caller can queue the
/// conversational reset before the waiting task wakes up.
#[derive(Debug)]
pub struct Completion {
    /// Task being completed.
    pub task_id: u64,
    text: String,
    resolver: oneshot::Sender<TaskOutcome>,
}

impl Completion {
    /// Wake the waiting task with its result.
    pub fn deliver(self) {
        // The waiter may have given up concurrently; nothing else to do then.
        let _ = self.resolver.send(Ok(self.text));
    }
}

/// What a frame did to the correlator.
#[derive(Debug)]
pub enum FrameDisposition {
    /// Completion frame matched the pending task.
    Completed(Completion),
    /// Completion frame paid off a timed-out task's debt.
    LateDiscarded,
    /// Completion frame arrived with no task pending.
    Unsolicited,
    /// Not a completion frame.
    Ignored,
}

/// Per-worker task correlation state.
#[derive(Debug)]
pub struct Correlator {
    agent: String,
    state: WorkerState,
    pending: Option<PendingTask>,
    late_frames: u32,
    next_task_id: u64,
}

impl Correlator {
    /// New correlator for a freshly started worker.
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            state: WorkerState::Starting,
            pending: None,
            late_frames: 0,
            next_task_id: 1,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Completion frames still owed by timed-out tasks.
    #[must_use]
    pub fn late_frames(&self) -> u32 {
        self.late_frames
    }

    /// Whether a task is awaiting its completion frame.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Register a new task with `deadline` and move the worker to `Busy`.
    ///
    /// # Errors
    ///
    /// - `AppError::WorkerClosed` if the worker is terminating or dead.
    /// - `AppError::Protocol` if a task is already in flight.
    pub fn begin(&mut self, deadline: Instant) -> Result<Dispatch> {
        if !self.state.accepts_task() {
            return Err(match self.state {
                WorkerState::Busy => AppError::Protocol(format!(
                    "worker for {} already has a task in flight",
                    self.agent
                )),
                _ => AppError::WorkerClosed(format!("worker for {} is not running", self.agent)),
            });
        }

        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let (resolver, receiver) = oneshot::channel();
        self.pending = Some(PendingTask {
            id: task_id,
            deadline,
            absorbed_late: false,
            resolver,
        });
        self.state = self.state.next(WorkerSignal::Dispatched);

        Ok(Dispatch {
            task_id,
            deadline,
            receiver,
        })
    }

    /// Feed one decoded frame.
    pub fn on_frame(&mut self, frame: InboundFrame) -> FrameDisposition {
        let InboundFrame::Result { text, is_error } = frame else {
            return FrameDisposition::Ignored;
        };

        if self.late_frames > 0 {
            self.late_frames -= 1;
            if let Some(pending) = self.pending.as_mut() {
                pending.absorbed_late = true;
            }
            debug!(
                agent = %self.agent,
                remaining = self.late_frames,
                "discarding late completion frame"
            );
            return FrameDisposition::LateDiscarded;
        }

        let Some(pending) = self.pending.take() else {
            return FrameDisposition::Unsolicited;
        };

        if is_error {
            debug!(agent = %self.agent, task_id = pending.id, "worker reported an error result");
        }

        self.state = self.state.next(WorkerSignal::Completed);
        FrameDisposition::Completed(Completion {
            task_id: pending.id,
            text,
            resolver: pending.resolver,
        })
    }

    /// Expire task `task_id` after its deadline.
    ///
    /// Returns `true` if the task was still pending: it is dropped, the
    /// worker returns to `Ready`, and one late frame becomes owed (or, if the
    /// task absorbed a frame as debt, all debt is cleared). Returns `false`
    /// if the task had already been completed or rejected.
    pub fn expire(&mut self, task_id: u64) -> bool {
        match self.pending.take() {
            Some(pending) if pending.id == task_id => {
                if pending.absorbed_late {
                    warn!(
                        agent = %self.agent,
                        task_id,
                        "task timed out after absorbing a late frame; assuming a dropped reply"
                    );
                    self.late_frames = 0;
                } else {
                    self.late_frames += 1;
                }
                self.state = self.state.next(WorkerSignal::TimedOut);
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// Drop task `task_id` without owing a frame (it never reached the worker).
    pub fn abandon(&mut self, task_id: u64) {
        if self.pending.as_ref().is_some_and(|pending| pending.id == task_id) {
            self.pending = None;
            self.state = self.state.next(WorkerSignal::Completed);
        }
    }

    /// Mark the worker terminating; a pending task is rejected.
    pub fn terminate(&mut self) {
        self.reject_pending("worker evicted");
        self.state = self.state.next(WorkerSignal::TerminateRequested);
    }

    /// Mark the worker dead; a pending task is rejected with `reason`.
    ///
    /// Returns `true` if a task was rejected.
    pub fn close(&mut self, reason: &str) -> bool {
        let rejected = self.reject_pending(reason);
        self.state = self.state.next(WorkerSignal::Closed);
        rejected
    }

    fn reject_pending(&mut self, reason: &str) -> bool {
        match self.pending.take() {
            Some(pending) => {
                let _ = pending.resolver.send(Err(AppError::WorkerClosed(format!(
                    "agent {}: {reason}",
                    self.agent
                ))));
                true
            }
            None => false,
        }
    }
}
