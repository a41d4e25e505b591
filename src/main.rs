#![forbid(unsafe_code)]

//! `agent-pool`: MCP server that routes tasks to long-lived agent workers.
//!
//! Bootstraps configuration, builds the agent pool, and serves the MCP
//! tools over stdio until the client disconnects or a shutdown signal
//! arrives. Logs go to stderr; stdout belongs to the protocol.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_pool::mcp::transport;
use agent_pool::orchestrator::AgentPool;
use agent_pool::{AppError, PoolConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-pool", about = "MCP agent pool server", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Working directory for workers; relative roots resolve against it.
    #[arg(long)]
    workdir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-pool server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let working_dir = match args.workdir {
        Some(dir) => dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workdir override: {err}")))?,
        None => std::env::current_dir()
            .map_err(|err| AppError::Config(format!("cannot determine working directory: {err}")))?,
    };
    let config = PoolConfig::load(args.config.as_deref(), working_dir)?;
    info!(
        agents_dir = %config.agents_dir.display(),
        worker_cli = %config.worker_cli,
        task_timeout_ms = config.task_timeout_ms,
        "configuration loaded"
    );

    // ── Build the pool ──────────────────────────────────
    let pool = AgentPool::new(&config);

    // ── Start transport ─────────────────────────────────
    let ct = CancellationToken::new();
    let stdio_ct = ct.clone();
    let stdio_pool = pool.clone();
    let mut stdio_handle = tokio::spawn(async move {
        if let Err(err) = transport::serve_stdio(stdio_pool, stdio_ct).await {
            error!(%err, "stdio transport failed");
        }
    });

    info!("MCP server ready");

    // ── Wait for shutdown signal or client disconnect ───
    let transport_done = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            false
        }
        _ = &mut stdio_handle => {
            info!("stdio transport closed");
            true
        }
    };
    ct.cancel();

    pool.shutdown().await;

    if !transport_done {
        let _ = stdio_handle.await;
    }
    info!("agent-pool shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
