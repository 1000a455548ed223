//! Remote transport abstraction and connection pooling.
//!
//! The remote shell protocol is an external collaborator: the core only
//! sees the [`RemoteTransport`] / [`RemoteConnection`] traits. A production
//! implementation over the `OpenSSH` client binary lives in [`ssh`]; the
//! bounded connection pool in [`pool`] works against the trait objects and
//! never touches protocol details.

pub mod pool;
pub mod ssh;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;

/// Chunk of remote process output, or its termination.
///
/// Stdout and stderr are kept distinct here because buffered execution
/// reports failures from stderr; streamed consumers treat both alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    /// Chunk of remote stdout.
    Stdout(Vec<u8>),
    /// Chunk of remote stderr.
    Stderr(Vec<u8>),
    /// Remote process exited with the given code.
    Exited(i32),
    /// Transport-level failure; no further events follow.
    Failed(String),
}

/// Out-of-band control signal deliverable to a remote process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Cooperative interruption (SIGINT-equivalent).
    Interrupt,
    /// Forced termination (SIGKILL-equivalent).
    Kill,
}

/// Clonable handle for delivering control signals to one remote invocation.
///
/// Delivery is best-effort: signals race process exit, so a handle whose
/// invocation already terminated swallows the send rather than erroring.
#[derive(Debug, Clone)]
pub struct SignalHandle {
    tx: mpsc::UnboundedSender<ControlSignal>,
}

impl SignalHandle {
    /// Wrap a sender feeding the transport's signal loop.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ControlSignal>) -> Self {
        Self { tx }
    }

    /// Request cooperative interruption of the remote process.
    pub fn interrupt(&self) {
        if self.tx.send(ControlSignal::Interrupt).is_err() {
            debug!("interrupt signal dropped: invocation already finished");
        }
    }

    /// Request forced termination of the remote process.
    pub fn kill(&self) {
        if self.tx.send(ControlSignal::Kill).is_err() {
            debug!("kill signal dropped: invocation already finished");
        }
    }
}

/// One in-flight remote command execution.
///
/// Output and termination arrive on `events`; `signals` delivers
/// out-of-band interrupts. The transport guarantees that exactly one of
/// [`ExecEvent::Exited`] or [`ExecEvent::Failed`] is the final event.
#[derive(Debug)]
pub struct ExecChannel {
    /// Ordered output and termination events.
    pub events: mpsc::Receiver<ExecEvent>,
    /// Signal handle for cancellation.
    pub signals: SignalHandle,
}

/// Established remote connection capable of running commands.
///
/// Owned by the pool; callers only ever see it through a checkout.
pub trait RemoteConnection: Send + Sync {
    /// Start executing `command` on the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`](crate::AppError::Connection) if the
    /// exec request cannot be issued.
    fn exec(&self, command: &str) -> Pin<Box<dyn Future<Output = Result<ExecChannel>> + Send + '_>>;

    /// Tear down the connection. Idempotent.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Factory for remote connections (the transport collaborator boundary).
pub trait RemoteTransport: Send + Sync {
    /// Establish a new connection to the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`](crate::AppError::Connection) on
    /// authentication or network failure.
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn RemoteConnection>>> + Send + '_>>;
}
