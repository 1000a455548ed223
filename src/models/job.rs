//! Job lifecycle model for in-flight remote invocations.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one remote invocation.
///
/// Transitions: `Running → {Completed, Failed, TimedOut, Cancelling}`,
/// `Cancelling → {Completed, Failed}`. The supervisor removes a job from
/// its registry when it reaches a terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Command is executing and producing output.
    Running,
    /// Interrupt sent; waiting for the remote process to wind down.
    Cancelling,
    /// Command finished and the stream closed.
    Completed,
    /// Transport failure or startup error terminated the job.
    Failed,
    /// Watchdog aborted the job after the idle-output ceiling.
    TimedOut,
}

impl JobState {
    /// Whether this state is terminal (the job is no longer tracked).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}
