//! Command execution over pooled remote connections.
//!
//! Two modes: [`run_buffered`](CommandRunner::run_buffered) collects output
//! to completion for short administrative commands; [`run_streamed`]
//! (CommandRunner::run_streamed) forwards chunks as they arrive for
//! long-running agent invocations. In both modes the pooled connection is
//! returned exactly once — released on orderly completion, evicted on
//! transport failure.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transport::pool::{Checkout, ConnectionPool};
use crate::transport::{ExecEvent, SignalHandle};
use crate::{AppError, Result};

/// Capacity of the per-command event channel between pump and consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event delivered to the consumer of a streamed command.
///
/// Stdout and stderr are merged into [`Data`](CommandEvent::Data): the
/// agent uses stderr for progress text, not as an error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Chunk of remote output (stdout or stderr alike).
    Data(Vec<u8>),
    /// Remote command completed with the given exit code.
    Closed(i32),
    /// Transport-level failure terminated the command.
    Failed(String),
}

/// Handle to one in-flight streamed command.
#[derive(Debug)]
pub struct RunningCommand {
    /// Out-of-band signal delivery for cancellation.
    pub signals: SignalHandle,
    /// Ordered command events; ends with one `Closed` or `Failed`.
    pub events: mpsc::Receiver<CommandEvent>,
}

/// Executes commands over connections checked out of the shared pool.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    pool: Arc<ConnectionPool>,
}

impl CommandRunner {
    /// Create a runner over the shared pool.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Run `command` to completion and return its stdout.
    ///
    /// Stdout and stderr are collected separately; on non-zero exit the
    /// failure body is stderr, falling back to stdout when stderr is
    /// empty.
    ///
    /// # Errors
    ///
    /// - [`AppError::PoolExhausted`] when no connection becomes free.
    /// - [`AppError::CommandFailed`] on non-zero remote exit.
    /// - [`AppError::Connection`] on transport failure (the connection is
    ///   evicted from the pool).
    pub async fn run_buffered(&self, command: &str) -> Result<String> {
        let checkout = self.pool.acquire().await?;
        let result = exec_buffered(&checkout, command).await;

        if matches!(result, Err(AppError::Connection(_))) {
            self.pool.evict(checkout.id()).await;
        } else {
            self.pool.release(checkout.id()).await;
        }

        result
    }

    /// Start `command` and stream its output.
    ///
    /// A background pump forwards every stdout/stderr chunk as
    /// [`CommandEvent::Data`], then exactly one of
    /// [`CommandEvent::Closed`] (graceful exit) or
    /// [`CommandEvent::Failed`] (transport failure). The pooled connection
    /// is returned on whichever of the two fires first — never both,
    /// never neither. If the consumer drops the receiver mid-run, the
    /// pump kills the remote command and evicts the connection, since its
    /// channel state is no longer known.
    ///
    /// # Errors
    ///
    /// - [`AppError::PoolExhausted`] when no connection becomes free.
    /// - [`AppError::Connection`] if the exec request fails (the
    ///   connection is evicted).
    pub async fn run_streamed(&self, command: &str) -> Result<RunningCommand> {
        let checkout = self.pool.acquire().await?;

        let exec = match checkout.connection().exec(command).await {
            Ok(exec) => exec,
            Err(err) => {
                self.pool.evict(checkout.id()).await;
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let signals = exec.signals.clone();
        tokio::spawn(pump(
            Arc::clone(&self.pool),
            checkout,
            exec.events,
            exec.signals,
            tx,
        ));

        Ok(RunningCommand {
            signals,
            events: rx,
        })
    }
}

/// Collect output until the exec channel terminates.
async fn exec_buffered(checkout: &Checkout, command: &str) -> Result<String> {
    let mut exec = checkout.connection().exec(command).await?;

    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();

    while let Some(event) = exec.events.recv().await {
        match event {
            ExecEvent::Stdout(chunk) => stdout.extend_from_slice(&chunk),
            ExecEvent::Stderr(chunk) => stderr.extend_from_slice(&chunk),
            ExecEvent::Exited(0) => return Ok(String::from_utf8_lossy(&stdout).into_owned()),
            ExecEvent::Exited(code) => {
                let body = if stderr.is_empty() { &stdout } else { &stderr };
                return Err(AppError::CommandFailed {
                    exit_code: code,
                    output: String::from_utf8_lossy(body).into_owned(),
                });
            }
            ExecEvent::Failed(msg) => return Err(AppError::Connection(msg)),
        }
    }

    Err(AppError::Connection(
        "exec stream ended without exit status".into(),
    ))
}

/// Forward exec events to the consumer and return the connection once.
async fn pump(
    pool: Arc<ConnectionPool>,
    checkout: Checkout,
    mut events: mpsc::Receiver<ExecEvent>,
    signals: SignalHandle,
    tx: mpsc::Sender<CommandEvent>,
) {
    loop {
        match events.recv().await {
            Some(ExecEvent::Stdout(chunk) | ExecEvent::Stderr(chunk)) => {
                if tx.send(CommandEvent::Data(chunk)).await.is_err() {
                    // Consumer vanished mid-run; the remote command may
                    // still be writing on this channel.
                    warn!(id = ?checkout.id(), "stream consumer dropped, killing remote command");
                    signals.kill();
                    pool.evict(checkout.id()).await;
                    return;
                }
            }
            Some(ExecEvent::Exited(code)) => {
                debug!(id = ?checkout.id(), code, "streamed command closed");
                let _ = tx.send(CommandEvent::Closed(code)).await;
                pool.release(checkout.id()).await;
                return;
            }
            Some(ExecEvent::Failed(msg)) => {
                warn!(id = ?checkout.id(), error = %msg, "streamed command failed");
                let _ = tx.send(CommandEvent::Failed(msg)).await;
                pool.evict(checkout.id()).await;
                return;
            }
            None => {
                // Transport dropped its sender without a final event.
                let _ = tx
                    .send(CommandEvent::Failed(
                        "exec stream ended without exit status".into(),
                    ))
                    .await;
                pool.evict(checkout.id()).await;
                return;
            }
        }
    }
}
