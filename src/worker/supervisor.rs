//! Worker process supervision.
//!
//! Two background tasks per real process:
//! - [`pump_stderr`] forwards stderr lines to the operator log. They never
//!   reach a caller.
//! - [`monitor_exit`] awaits process exit, marks the worker dead, and emits
//!   [`WorkerEvent::Retired`]. When the worker is evicted it sends SIGTERM,
//!   allows a grace period, then kills.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::worker::correlator::Correlator;
use crate::worker::spawner::BoxedReader;
use crate::worker::WorkerEvent;

/// Forward every stderr line of a worker to the log until EOF.
#[must_use]
pub fn pump_stderr(agent: String, stderr: BoxedReader) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        warn!(agent, line = %line, "worker stderr");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(agent, %err, "worker stderr read failed, stopping");
                    break;
                }
            }
        }
    })
}

/// Spawn a task that waits for `child` to exit and retires the worker.
///
/// When `cancel` fires the child is asked to terminate first and is killed
/// if it has not exited within `grace`.
#[must_use]
pub fn monitor_exit(
    agent: String,
    worker_id: u64,
    mut child: Child,
    correlator: Arc<Mutex<Correlator>>,
    event_tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = tokio::select! {
            result = child.wait() => describe_exit(&agent, result),
            () = cancel.cancelled() => {
                info!(agent, worker_id, "terminating worker process");
                let result = terminate_child(&mut child, grace).await;
                describe_exit(&agent, result)
            }
        };

        info!(agent, worker_id, %reason, "worker process exited");
        correlator.lock().await.close(&reason);

        let event = WorkerEvent::Retired {
            agent: agent.clone(),
            worker_id,
            reason,
        };
        if event_tx.send(event).await.is_err() {
            debug!(agent, "event channel closed before retirement could be delivered");
        }
    })
}

fn describe_exit(agent: &str, result: std::io::Result<ExitStatus>) -> String {
    match result {
        Ok(status) => status.code().map_or_else(
            || "process terminated by signal".to_owned(),
            |code| format!("process exited with code {code}"),
        ),
        Err(err) => {
            warn!(agent, %err, "error waiting for worker process");
            format!("wait error: {err}")
        }
    }
}

/// Politely stop `child`, escalating to a kill after `grace`.
async fn terminate_child(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    send_terminate(child);

    if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
        return result;
    }

    warn!(
        pid = child.id().unwrap_or(0),
        "worker ignored termination signal, killing"
    );
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn send_terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %err, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "failed to start kill");
    }
}
