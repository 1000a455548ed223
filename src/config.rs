//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::supervisor::JobSettings;
use crate::transport::pool::PoolSettings;
use crate::{AppError, Result};

/// Remote host connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SshConfig {
    /// Remote host name or address.
    pub host: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Remote user name.
    pub user: String,
    /// Path to the private key used for authentication.
    pub key_path: PathBuf,
    /// Directory for control-master sockets.
    #[serde(default = "default_control_dir")]
    pub control_dir: PathBuf,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_control_dir() -> PathBuf {
    std::env::temp_dir().join("catalyst-remote")
}

/// Connection pool sizing and wait bounds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Maximum simultaneously established connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Bound on the wait for a freed connection at capacity.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Poll interval while waiting for a freed connection.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_connections() -> usize {
    3
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Job supervision timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct JobConfig {
    /// Idle-output ceiling before the watchdog aborts a job.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Interval between watchdog sweeps.
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    /// Grace window between interrupt and forced kill.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_idle_timeout_ms() -> u64 {
    600_000
}

fn default_watchdog_interval_ms() -> u64 {
    30_000
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

/// Remote agent invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary on the remote host.
    #[serde(default = "default_agent_binary")]
    pub binary: String,
    /// Tool allowlist applied to chat invocations.
    #[serde(default = "default_chat_tools")]
    pub chat_tools: String,
    /// Remote base directory holding idea project directories.
    pub ideas_base_path: String,
}

fn default_agent_binary() -> String {
    "claude".into()
}

fn default_chat_tools() -> String {
    "Read,Grep,Glob".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Remote host connectivity.
    pub ssh: SshConfig,
    /// Connection pool sizing and wait bounds.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Job supervision timing.
    #[serde(default)]
    pub job: JobConfig,
    /// Remote agent invocation settings.
    pub agent: AgentConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Pool settings derived from the millisecond fields.
    #[must_use]
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.pool.max_connections,
            acquire_timeout: Duration::from_millis(self.pool.acquire_timeout_ms),
            poll_interval: Duration::from_millis(self.pool.poll_interval_ms),
        }
    }

    /// Job supervision settings derived from the millisecond fields.
    #[must_use]
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            idle_timeout: Duration::from_millis(self.job.idle_timeout_ms),
            watchdog_interval: Duration::from_millis(self.job.watchdog_interval_ms),
            cancel_grace: Duration::from_millis(self.job.cancel_grace_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ssh.host.is_empty() {
            return Err(AppError::Config("ssh.host must not be empty".into()));
        }
        if self.ssh.user.is_empty() {
            return Err(AppError::Config("ssh.user must not be empty".into()));
        }
        if self.pool.max_connections == 0 {
            return Err(AppError::Config(
                "pool.max_connections must be greater than zero".into(),
            ));
        }
        if self.pool.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "pool.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.job.idle_timeout_ms == 0 || self.job.watchdog_interval_ms == 0 {
            return Err(AppError::Config(
                "job timeouts must be greater than zero".into(),
            ));
        }
        if self.agent.ideas_base_path.is_empty() {
            return Err(AppError::Config(
                "agent.ideas_base_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}
