//! Pool configuration parsing, environment overrides, and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Environment variable overriding [`PoolConfig::agents_dir`].
pub const ENV_AGENTS_DIR: &str = "AGENTS_DIR";
/// Environment variable overriding [`PoolConfig::skills_dir`].
pub const ENV_SKILLS_DIR: &str = "SKILLS_DIR";
/// Environment variable overriding [`PoolConfig::expertise_dir`].
pub const ENV_EXPERTISE_DIR: &str = "EXPERTISE_DIR";
/// Environment variable overriding [`PoolConfig::task_timeout_ms`].
pub const ENV_TASK_TIMEOUT_MS: &str = "TASK_TIMEOUT_MS";
/// Environment variable overriding [`PoolConfig::worker_cli`].
pub const ENV_WORKER_CLI: &str = "CLAUDE_CLI";
/// Environment variable overriding [`PoolConfig::skill_file`].
pub const ENV_SKILL_FILE: &str = "AGENT_POOL_SKILL_FILE";

fn default_agents_dir() -> PathBuf {
    PathBuf::from(".claude/agents")
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from(".claude/skills")
}

fn default_expertise_dir() -> PathBuf {
    PathBuf::from(".claude/expertise")
}

fn default_skill_file() -> String {
    "DEFINITION.md".into()
}

fn default_task_timeout_ms() -> u64 {
    300_000
}

fn default_worker_cli() -> String {
    "claude".into()
}

fn default_worker_args() -> Vec<String> {
    [
        "--input-format",
        "stream-json",
        "--output-format",
        "stream-json",
        "--dangerously-skip-permissions",
    ]
    .iter()
    .map(|arg| (*arg).to_owned())
    .collect()
}

fn default_prompt_arg() -> String {
    "--system-prompt".into()
}

fn default_termination_grace_ms() -> u64 {
    5_000
}

/// Pool configuration, optionally parsed from a TOML file and overlaid with
/// environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PoolConfig {
    /// Trusted root holding `<agent>.md` definitions.
    #[serde(default = "default_agents_dir")]
    pub agents_dir: PathBuf,
    /// Trusted root holding `<skill>/<skill_file>` documents.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
    /// Trusted root holding `<expertise>.md` documents.
    #[serde(default = "default_expertise_dir")]
    pub expertise_dir: PathBuf,
    /// File name loaded from inside each skill directory.
    #[serde(default = "default_skill_file")]
    pub skill_file: String,
    /// Per-task completion deadline in milliseconds.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Worker executable.
    #[serde(default = "default_worker_cli")]
    pub worker_cli: String,
    /// Arguments passed to the worker before the prompt argument.
    #[serde(default = "default_worker_args")]
    pub worker_args: Vec<String>,
    /// Flag that carries the composed prompt (`--system-prompt`).
    #[serde(default = "default_prompt_arg")]
    pub prompt_arg: String,
    /// When set, the worker environment is cleared and only these
    /// variables are passed through.
    #[serde(default)]
    pub env_allowlist: Option<Vec<String>>,
    /// How long an evicted worker gets between SIGTERM and a hard kill.
    #[serde(default = "default_termination_grace_ms")]
    pub termination_grace_ms: u64,
    /// Directory the pool runs in; relative roots resolve against it.
    #[serde(skip)]
    working_dir: PathBuf,
}

impl PoolConfig {
    /// Load configuration: optional TOML file, then process environment
    /// overrides, then validation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn load(path: Option<&Path>, working_dir: PathBuf) -> Result<Self> {
        let raw = match path {
            Some(path) => fs::read_to_string(path)
                .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?,
            None => String::new(),
        };
        Self::from_sources(&raw, working_dir, |key| env::var(key).ok())
    }

    /// Parse configuration from a TOML string without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str, working_dir: PathBuf) -> Result<Self> {
        Self::from_sources(raw, working_dir, |_| None)
    }

    /// Parse `raw`, apply overrides from `lookup`, then validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing, an override, or validation fails.
    pub fn from_sources(
        raw: &str,
        working_dir: PathBuf,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.working_dir = working_dir;
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Directory the pool runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Task deadline as a [`Duration`].
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Eviction grace period as a [`Duration`].
    #[must_use]
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let set = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = set(ENV_AGENTS_DIR) {
            self.agents_dir = PathBuf::from(dir);
        }
        if let Some(dir) = set(ENV_SKILLS_DIR) {
            self.skills_dir = PathBuf::from(dir);
        }
        if let Some(dir) = set(ENV_EXPERTISE_DIR) {
            self.expertise_dir = PathBuf::from(dir);
        }
        if let Some(file) = set(ENV_SKILL_FILE) {
            self.skill_file = file;
        }
        if let Some(cli) = set(ENV_WORKER_CLI) {
            self.worker_cli = cli;
        }
        if let Some(ms) = set(ENV_TASK_TIMEOUT_MS) {
            self.task_timeout_ms = ms.trim().parse().map_err(|err| {
                AppError::Config(format!("{ENV_TASK_TIMEOUT_MS} must be an integer: {err}"))
            })?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.task_timeout_ms == 0 {
            return Err(AppError::Config(
                "task_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.worker_cli.trim().is_empty() {
            return Err(AppError::Config("worker_cli must not be empty".into()));
        }

        if self.prompt_arg.trim().is_empty() {
            return Err(AppError::Config("prompt_arg must not be empty".into()));
        }

        if self.skill_file.is_empty() || self.skill_file.contains(['/', '\\']) {
            return Err(AppError::Config(format!(
                "skill_file must be a plain file name, got '{}'",
                self.skill_file
            )));
        }

        let agents_dir = self.working_dir.join(&self.agents_dir);
        self.agents_dir = agents_dir.canonicalize().map_err(|err| {
            AppError::Config(format!(
                "agents_dir {} invalid: {err}",
                agents_dir.display()
            ))
        })?;
        // Skills and expertise roots are optional; missing ones are skipped at compose time.
        self.skills_dir = self.working_dir.join(&self.skills_dir);
        self.expertise_dir = self.working_dir.join(&self.expertise_dir);

        Ok(())
    }
}
