//! Live worker handle owned by the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::models::agent::AgentName;
use crate::models::worker::{WorkerInfo, WorkerState};
use crate::worker::correlator::Correlator;
use crate::worker::frame::OutboundMessage;
use crate::worker::reader::{run_reader, ReaderExit};
use crate::worker::spawner::WorkerIo;
use crate::worker::supervisor::{monitor_exit, pump_stderr};
use crate::worker::writer::run_writer;
use crate::worker::WorkerEvent;
use crate::{AppError, Result};

/// Capacity of the outbound message queue per worker.
const OUTBOUND_CAPACITY: usize = 16;

/// A running worker: its stdio tasks, task correlation, and task gate.
///
/// Tasks sent through [`WorkerHandle::run_task`] are strictly serialized.
#[derive(Debug)]
pub struct WorkerHandle {
    worker_id: u64,
    agent: String,
    pid: Option<u32>,
    correlator: Arc<Mutex<Correlator>>,
    task_gate: Mutex<()>,
    outbound: mpsc::Sender<OutboundMessage>,
    cancel: CancellationToken,
    exit_monitor: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Start the reader, writer and supervision tasks for `io`.
    ///
    /// Must be called from within a tokio runtime. Retirement is reported
    /// on `event_tx`; `grace` bounds how long an evicted process may take
    /// to exit after SIGTERM.
    #[must_use]
    pub fn attach(
        agent: &AgentName,
        worker_id: u64,
        io: WorkerIo,
        event_tx: mpsc::Sender<WorkerEvent>,
        grace: Duration,
    ) -> Arc<Self> {
        let agent_name = agent.as_str().to_owned();
        let correlator = Arc::new(Mutex::new(Correlator::new(agent_name.clone())));
        let (outbound, msg_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let cancel = CancellationToken::new();
        let span = info_span!("worker", agent = %agent_name, worker_id, pid = io.pid.unwrap_or(0));

        let WorkerIo {
            pid,
            stdin,
            stdout,
            stderr,
            child,
        } = io;

        {
            let agent = agent_name.clone();
            let correlator = Arc::clone(&correlator);
            let cancel = cancel.clone();
            let event_tx = event_tx.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = run_writer(agent.clone(), stdin, msg_rx, cancel.clone()).await {
                        let reason = err.to_string();
                        correlator.lock().await.close(&reason);
                        retire(&event_tx, agent, worker_id, reason).await;
                    }
                }
                .instrument(span.clone()),
            );
        }

        {
            let agent = agent_name.clone();
            let correlator = Arc::clone(&correlator);
            let outbound = outbound.clone();
            let cancel = cancel.clone();
            let event_tx = event_tx.clone();
            tokio::spawn(
                async move {
                    let exit = run_reader(agent.clone(), stdout, correlator, outbound, cancel).await;
                    match exit {
                        ReaderExit::Cancelled => {}
                        ReaderExit::Eof => {
                            retire(&event_tx, agent, worker_id, "output stream closed".into()).await;
                        }
                        ReaderExit::Failed(err) => {
                            retire(&event_tx, agent, worker_id, err).await;
                        }
                    }
                }
                .instrument(span.clone()),
            );
        }

        if let Some(stderr) = stderr {
            drop(pump_stderr(agent_name.clone(), stderr));
        }

        let exit_monitor = child.map(|child| {
            monitor_exit(
                agent_name.clone(),
                worker_id,
                child,
                Arc::clone(&correlator),
                event_tx,
                cancel.clone(),
                grace,
            )
        });

        Arc::new(Self {
            worker_id,
            agent: agent_name,
            pid,
            correlator,
            task_gate: Mutex::new(()),
            outbound,
            cancel,
            exit_monitor: Mutex::new(exit_monitor),
        })
    }

    /// Generation id assigned by the pool.
    #[must_use]
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Agent this worker serves.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// OS process id, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        self.correlator.lock().await.state()
    }

    /// Whether the worker can still serve tasks.
    pub async fn is_live(&self) -> bool {
        self.state().await.is_live()
    }

    /// Snapshot for listing.
    pub async fn info(&self) -> WorkerInfo {
        WorkerInfo {
            name: self.agent.clone(),
            pid: self.pid,
            state: self.state().await,
        }
    }

    /// Send `task` and wait for its completion frame or `timeout`.
    ///
    /// Waits for any earlier task on this worker to finish first; the
    /// timeout starts once the task is written.
    ///
    /// # Errors
    ///
    /// - `AppError::TaskTimeout` if no completion frame arrives in time. The
    ///   worker is kept, returns to `Ready`, and receives a context reset.
    /// - `AppError::WorkerClosed` if the worker dies, is evicted, or its
    ///   stdin is closed while the task is pending.
    pub async fn run_task(&self, task: &str, timeout: Duration) -> Result<String> {
        let _slot = self.task_gate.lock().await;

        let deadline = Instant::now() + timeout;
        let mut dispatch = self.correlator.lock().await.begin(deadline)?;
        let task_id = dispatch.task_id;

        let span = info_span!("run_task", agent = %self.agent, task_id);
        async {
            if self.outbound.send(OutboundMessage::user(task)).await.is_err() {
                self.correlator.lock().await.abandon(task_id);
                return Err(AppError::WorkerClosed(format!(
                    "agent {}: stdin closed",
                    self.agent
                )));
            }
            debug!("task dispatched");

            match tokio::time::timeout_at(dispatch.deadline, &mut dispatch.receiver).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(AppError::WorkerClosed(format!(
                    "agent {}: process closed",
                    self.agent
                ))),
                Err(_elapsed) => {
                    if self.correlator.lock().await.expire(task_id) {
                        warn!("task timed out; worker kept");
                        if self.outbound.send(OutboundMessage::reset()).await.is_err() {
                            debug!("writer closed, context reset not sent after timeout");
                        }
                        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                        Err(AppError::TaskTimeout(ms))
                    } else {
                        // Completed or rejected while the timer fired; that outcome wins.
                        dispatch.receiver.await.unwrap_or_else(|_| {
                            Err(AppError::WorkerClosed(format!(
                                "agent {}: process closed",
                                self.agent
                            )))
                        })
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Begin eviction: reject any pending task, stop stdio tasks, and
    /// signal the process to terminate.
    pub async fn terminate(&self) {
        self.correlator.lock().await.terminate();
        self.cancel.cancel();
    }

    /// Wait until the worker process has exited and been reaped.
    ///
    /// Returns at once for workers without a process, or if another caller
    /// already waited.
    pub async fn wait_for_exit(&self) {
        let Some(monitor) = self.exit_monitor.lock().await.take() else {
            return;
        };
        if let Err(err) = monitor.await {
            warn!(agent = %self.agent, %err, "exit monitor task failed");
        }
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn retire(event_tx: &mpsc::Sender<WorkerEvent>, agent: String, worker_id: u64, reason: String) {
    let event = WorkerEvent::Retired {
        agent,
        worker_id,
        reason,
    };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed before retirement could be delivered");
    }
}
