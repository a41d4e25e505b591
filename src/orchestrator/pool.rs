//! Agent pool registry.
//!
//! Maps each agent name to at most one live [`WorkerHandle`]. The map sits
//! behind a single async mutex that is only held briefly. Spawning takes a
//! per-agent lock and re-checks the map under it, so concurrent callers for
//! the same agent share one spawn while other agents are unaffected.
//! Workers retire themselves through [`WorkerEvent`]s; the event consumer
//! only removes an entry whose generation id still matches, so a late exit
//! of an old process never evicts its replacement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::PoolConfig;
use crate::models::agent::AgentName;
use crate::models::worker::WorkerInfo;
use crate::prompt::PromptComposer;
use crate::worker::{Launcher, ProcessLauncher, WorkerEvent, WorkerHandle};
use crate::{AppError, Result};

/// Capacity of the worker event channel.
const EVENT_CAPACITY: usize = 64;

/// Extra time `shutdown` allows beyond the termination grace for processes to be reaped.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// Shared registry map keyed by agent name.
type WorkerMap = Arc<Mutex<HashMap<String, Arc<WorkerHandle>>>>;

/// Pool of long-lived agent workers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    composer: PromptComposer,
    launcher: Arc<dyn Launcher>,
    task_timeout: Duration,
    termination_grace: Duration,
    workers: WorkerMap,
    spawn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    next_worker_id: AtomicU64,
    event_tx: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
}

impl AgentPool {
    /// Build a pool that launches real worker processes per `config`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: &PoolConfig) -> Self {
        Self::with_launcher(
            PromptComposer::from_config(config),
            Arc::new(ProcessLauncher::from_config(config)),
            config.task_timeout(),
            config.termination_grace(),
        )
    }

    /// Build a pool with a custom [`Launcher`].
    ///
    /// Must be called from within a tokio runtime; spawns the event consumer.
    #[must_use]
    pub fn with_launcher(
        composer: PromptComposer,
        launcher: Arc<dyn Launcher>,
        task_timeout: Duration,
        termination_grace: Duration,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let workers = WorkerMap::default();
        let shutdown = CancellationToken::new();

        drop(spawn_event_consumer(
            Arc::clone(&workers),
            event_rx,
            shutdown.clone(),
        ));

        Self {
            inner: Arc::new(PoolInner {
                composer,
                launcher,
                task_timeout,
                termination_grace,
                workers,
                spawn_locks: Mutex::new(HashMap::new()),
                next_worker_id: AtomicU64::new(1),
                event_tx,
                shutdown,
            }),
        }
    }

    /// Return the live worker for `agent`, spawning one if needed.
    ///
    /// Spawns are serialized per agent, so concurrent callers for one agent
    /// share a single worker while other agents spawn independently.
    ///
    /// # Errors
    ///
    /// - `AppError::DefinitionNotFound`, `AppError::InvalidDefinition` or
    ///   `AppError::PathTraversal` from prompt composition; no entry is created.
    /// - `AppError::Spawn` if the worker cannot be started; no entry is created.
    /// - `AppError::WorkerClosed` if the pool shut down during the spawn.
    pub async fn get_or_create(&self, agent: &AgentName) -> Result<Arc<WorkerHandle>> {
        if let Some(live) = self.live_worker(agent).await {
            return Ok(live);
        }

        let spawn_lock = self.spawn_lock(agent).await;
        let result = {
            let _spawning = spawn_lock.lock().await;
            match self.live_worker(agent).await {
                Some(live) => Ok(live),
                None => self.spawn(agent).await,
            }
        };
        self.release_spawn_lock(agent, &spawn_lock).await;
        result
    }

    async fn live_worker(&self, agent: &AgentName) -> Option<Arc<WorkerHandle>> {
        let workers = self.inner.workers.lock().await;
        let existing = workers.get(agent.as_str())?;
        if existing.is_live().await {
            Some(Arc::clone(existing))
        } else {
            debug!(agent = %agent, worker_id = existing.worker_id(), "replacing dead worker");
            None
        }
    }

    /// Compose, launch and register a worker. Caller holds `agent`'s spawn lock.
    async fn spawn(&self, agent: &AgentName) -> Result<Arc<WorkerHandle>> {
        let span = info_span!("spawn_agent", agent = %agent);
        let handle = async {
            let prompt = self.inner.composer.compose(agent).await?;
            let io = self.inner.launcher.launch(agent, &prompt)?;
            let worker_id = self.inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let handle = WorkerHandle::attach(
                agent,
                worker_id,
                io,
                self.inner.event_tx.clone(),
                self.inner.termination_grace,
            );
            info!(worker_id, pid = handle.pid().unwrap_or(0), "agent worker started");
            Ok::<_, AppError>(handle)
        }
        .instrument(span)
        .await?;

        let mut workers = self.inner.workers.lock().await;
        if self.inner.shutdown.is_cancelled() {
            drop(workers);
            handle.terminate().await;
            return Err(AppError::WorkerClosed(format!(
                "agent {agent}: pool is shutting down"
            )));
        }
        workers.insert(agent.as_str().to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn spawn_lock(&self, agent: &AgentName) -> Arc<Mutex<()>> {
        let mut locks = self.inner.spawn_locks.lock().await;
        Arc::clone(locks.entry(agent.as_str().to_owned()).or_default())
    }

    /// Drop `agent`'s spawn lock once no other caller is waiting on it.
    async fn release_spawn_lock(&self, agent: &AgentName, spawn_lock: &Arc<Mutex<()>>) {
        let mut locks = self.inner.spawn_locks.lock().await;
        let idle = locks
            .get(agent.as_str())
            .is_some_and(|held| Arc::ptr_eq(held, spawn_lock) && Arc::strong_count(held) == 2);
        if idle {
            locks.remove(agent.as_str());
        }
    }

    /// Run `task` on `agent`'s worker and return the result text.
    ///
    /// A worker whose stream closed during the task is dropped from the
    /// pool so the next call respawns it.
    ///
    /// # Errors
    ///
    /// - `AppError::PathTraversal` for an invalid agent name.
    /// - Any error from [`AgentPool::get_or_create`].
    /// - `AppError::TaskTimeout` or `AppError::WorkerClosed` from the task.
    pub async fn invoke(&self, agent: &str, task: &str) -> Result<String> {
        let name = AgentName::parse(agent)?;
        let handle = self.get_or_create(&name).await?;

        let outcome = handle.run_task(task, self.inner.task_timeout).await;
        if let Err(AppError::WorkerClosed(ref reason)) = outcome {
            warn!(agent, %reason, "worker closed during task, retiring");
            self.retire(agent, handle.worker_id()).await;
        }
        outcome
    }

    /// Spawn `agent`'s worker ahead of its first task.
    ///
    /// Returns the worker's process id.
    ///
    /// # Errors
    ///
    /// Same as [`AgentPool::get_or_create`], plus `AppError::PathTraversal`
    /// for an invalid agent name.
    pub async fn warmup(&self, agent: &str) -> Result<Option<u32>> {
        let name = AgentName::parse(agent)?;
        let handle = self.get_or_create(&name).await?;
        Ok(handle.pid())
    }

    /// Snapshot of live workers, sorted by agent name.
    pub async fn list(&self) -> Vec<WorkerInfo> {
        let handles: Vec<Arc<WorkerHandle>> =
            self.inner.workers.lock().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            let info = handle.info().await;
            if info.state.is_live() {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Remove `agent`'s worker and signal it to terminate.
    ///
    /// Returns whether a worker was present. Unknown names are a no-op.
    pub async fn evict(&self, agent: &str) -> bool {
        let removed = self.inner.workers.lock().await.remove(agent);
        match removed {
            Some(handle) => {
                info!(agent, worker_id = handle.worker_id(), "evicting agent worker");
                handle.terminate().await;
                true
            }
            None => false,
        }
    }

    /// Evict every worker, wait for their processes to exit, and stop the
    /// event consumer.
    ///
    /// Each process gets the termination grace period before it is killed;
    /// the wait as a whole is bounded by that grace plus a short margin.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained: Vec<Arc<WorkerHandle>> = self
            .inner
            .workers
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        info!(workers = drained.len(), "shutting down agent pool");
        for handle in &drained {
            handle.terminate().await;
        }

        let exits = join_all(drained.iter().map(|handle| handle.wait_for_exit()));
        if tokio::time::timeout(self.inner.termination_grace + SHUTDOWN_MARGIN, exits)
            .await
            .is_err()
        {
            warn!("worker processes still running after shutdown grace");
        }
    }

    async fn retire(&self, agent: &str, worker_id: u64) {
        remove_generation(&self.inner.workers, agent, worker_id).await;
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("task_timeout", &self.inner.task_timeout)
            .finish_non_exhaustive()
    }
}

/// Remove `agent`'s entry only if it is still generation `worker_id`.
async fn remove_generation(workers: &WorkerMap, agent: &str, worker_id: u64) -> bool {
    let mut guard = workers.lock().await;
    if guard
        .get(agent)
        .is_some_and(|handle| handle.worker_id() == worker_id)
    {
        guard.remove(agent);
        true
    } else {
        false
    }
}

fn spawn_event_consumer(
    workers: WorkerMap,
    mut event_rx: mpsc::Receiver<WorkerEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("worker event consumer shutting down");
                    break;
                }
                event = event_rx.recv() => {
                    let Some(WorkerEvent::Retired { agent, worker_id, reason }) = event else {
                        break;
                    };
                    if remove_generation(&workers, &agent, worker_id).await {
                        info!(agent, worker_id, %reason, "worker retired from pool");
                    } else {
                        debug!(agent, worker_id, %reason, "stale worker retirement ignored");
                    }
                }
            }
        }
    })
}
