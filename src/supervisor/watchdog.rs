//! Idle-output watchdog — liveness guard against wedged remote processes.
//!
//! A single background task sweeps the supervisor's job registry at a
//! fixed interval and times out any `Running` job whose last output is
//! older than the configured ceiling. Independent of exit codes: a remote
//! process that hangs without closing its stream is still reaped.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::supervisor::JobSupervisor;

/// Spawn the periodic idle-output sweep for `supervisor`.
///
/// The task ticks every `watchdog_interval` until `cancel` fires. Each
/// breach triggers exactly one cancellation sequence (interrupt, then
/// forced kill after the grace window) and one timeout error event.
#[must_use]
pub fn spawn_watchdog(
    supervisor: Arc<JobSupervisor>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = supervisor.settings().watchdog_interval;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("job watchdog shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            supervisor.check_idle_jobs().await;
        }
    })
}
