//! Worker process spawner.
//!
//! [`Launcher`] is the seam between the pool and the operating system. The
//! production [`ProcessLauncher`] starts the configured worker CLI with:
//! - the composed prompt passed as a single argument at spawn time, before
//!   any task is written,
//! - stdin, stdout and stderr piped,
//! - `kill_on_drop(true)` so an abandoned child never outlives its handle,
//! - either the inherited environment or, when an allowlist is configured,
//!   `env_clear()` plus the listed variables.
//!
//! Tests supply in-memory streams through [`WorkerIo::from_streams`].

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{info, info_span};

use crate::config::PoolConfig;
use crate::models::agent::AgentName;
use crate::prompt::ComposedPrompt;
use crate::{AppError, Result};

/// Boxed worker stdin.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Boxed worker stdout or stderr.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Streams and process handle of a launched worker.
pub struct WorkerIo {
    /// OS process id, if the worker is a real process.
    pub pid: Option<u32>,
    /// Worker input.
    pub stdin: BoxedWriter,
    /// Worker protocol output.
    pub stdout: BoxedReader,
    /// Worker diagnostics, forwarded to the operator log.
    pub stderr: Option<BoxedReader>,
    /// Child handle for exit monitoring and termination.
    pub child: Option<Child>,
}

impl WorkerIo {
    /// Worker backed by arbitrary streams and no OS process.
    #[must_use]
    pub fn from_streams(
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            pid: None,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: None,
            child: None,
        }
    }
}

impl std::fmt::Debug for WorkerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerIo")
            .field("pid", &self.pid)
            .field("has_stderr", &self.stderr.is_some())
            .field("has_child", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

/// Starts worker processes for the pool.
pub trait Launcher: Send + Sync {
    /// Start a worker for `agent` initialised with `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the worker cannot be started.
    fn launch(&self, agent: &AgentName, prompt: &ComposedPrompt) -> Result<WorkerIo>;
}

/// Launches the configured worker CLI as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    /// Worker executable.
    pub program: String,
    /// Arguments placed before the prompt argument.
    pub args: Vec<String>,
    /// Flag preceding the composed prompt.
    pub prompt_arg: String,
    /// Directory the worker starts in.
    pub working_dir: PathBuf,
    /// When set, only these environment variables reach the worker.
    pub env_allowlist: Option<Vec<String>>,
}

impl ProcessLauncher {
    /// Build a launcher from validated configuration.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            program: config.worker_cli.clone(),
            args: config.worker_args.clone(),
            prompt_arg: config.prompt_arg.clone(),
            working_dir: config.working_dir().to_path_buf(),
            env_allowlist: config.env_allowlist.clone(),
        }
    }

    fn command(&self, prompt: &ComposedPrompt) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&self.prompt_arg)
            .arg(prompt.render());

        if let Some(allowlist) = &self.env_allowlist {
            cmd.env_clear();
            for key in allowlist {
                if let Ok(val) = std::env::var(key) {
                    cmd.env(key, val);
                }
            }
        }

        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, agent: &AgentName, prompt: &ComposedPrompt) -> Result<WorkerIo> {
        let span = info_span!("spawn_worker", agent = %agent, program = %self.program);
        let _guard = span.enter();

        let mut child = self
            .command(prompt)
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to spawn {}: {err}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture worker stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture worker stdout".into()))?;
        let stderr = child.stderr.take();
        let pid = child.id();

        info!(pid = pid.unwrap_or(0), "worker process spawned");

        Ok(WorkerIo {
            pid,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: stderr.map(|s| Box::new(s) as BoxedReader),
            child: Some(child),
        })
    }
}
