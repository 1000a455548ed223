//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Transport-level failure (connect, exec, or mid-stream).
    Connection(String),
    /// No pooled connection became free within the wait bound.
    PoolExhausted(String),
    /// Remote command exited non-zero in buffered mode.
    CommandFailed {
        /// Remote exit code.
        exit_code: i32,
        /// Captured diagnostic text (stderr, falling back to stdout).
        output: String,
    },
    /// A non-terminal job already exists for the session.
    AlreadyRunning(String),
    /// Watchdog aborted the job after the idle-output ceiling.
    TimedOut(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::PoolExhausted(msg) => write!(f, "pool exhausted: {msg}"),
            Self::CommandFailed { exit_code, output } => {
                write!(f, "command failed ({exit_code}): {output}")
            }
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::TimedOut(msg) => write!(f, "timed out: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
