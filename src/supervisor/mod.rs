//! Job lifecycle supervision: one remote invocation per logical session.
//!
//! The supervisor admits at most one non-terminal job per session id
//! (admission check and registry insert are a single atomic step), wires
//! streamed command output through a fresh [`LineDecoder`] into the
//! outward event protocol, persists the remote session token on first
//! sight, and implements cooperative cancellation: interrupt first, then
//! a forced kill when the grace window expires. The idle-output watchdog
//! lives in [`watchdog`].

pub mod watchdog;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::job::JobState;
use crate::models::message::StreamMessage;
use crate::models::session::SessionPatch;
use crate::relay::{EventRelay, OutwardEvent};
use crate::runner::{CommandEvent, CommandRunner, RunningCommand};
use crate::store::SessionStore;
use crate::stream::LineDecoder;
use crate::transport::SignalHandle;
use crate::{AppError, Result};

/// Timing knobs for job supervision.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Ceiling on `now − last_output` before the watchdog aborts a job.
    pub idle_timeout: Duration,
    /// Interval between watchdog sweeps.
    pub watchdog_interval: Duration,
    /// Window between interrupt and forced kill during cancellation.
    pub cancel_grace: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            watchdog_interval: Duration::from_secs(30),
            cancel_grace: Duration::from_secs(5),
        }
    }
}

/// Shared per-job state, visible to the pump, watchdog, and cancel paths.
struct JobShared {
    session_id: String,
    state: StdMutex<JobState>,
    /// Milliseconds since the supervisor epoch at the last output chunk.
    last_output_ms: AtomicU64,
    /// Guards the one-terminal-event-per-job invariant.
    terminal_sent: AtomicBool,
    /// Guards the one-cancellation-sequence-per-job invariant.
    cancel_started: AtomicBool,
    /// Filled in once the streamed command has started.
    signals: StdMutex<Option<SignalHandle>>,
    /// Fired when the job reaches a terminal state in the pump.
    done: CancellationToken,
    relay: EventRelay,
    event_tx: mpsc::Sender<OutwardEvent>,
}

impl JobShared {
    fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: JobState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Claim the right to emit the terminal outward event.
    fn claim_terminal(&self) -> bool {
        self.terminal_sent
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn signal_interrupt(&self) {
        let guard = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(signals) = guard.as_ref() {
            signals.interrupt();
        }
    }

    fn signal_kill(&self) {
        let guard = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(signals) = guard.as_ref() {
            signals.kill();
        }
    }

    /// Whether the streamed command has been wired up yet.
    fn has_signals(&self) -> bool {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

type JobRegistry = Arc<Mutex<HashMap<String, Arc<JobShared>>>>;

/// Tracks and supervises at most one active remote invocation per session.
pub struct JobSupervisor {
    runner: CommandRunner,
    store: Arc<dyn SessionStore>,
    settings: JobSettings,
    registry: JobRegistry,
    epoch: Instant,
}

impl JobSupervisor {
    /// Create a supervisor over the given runner and session store.
    #[must_use]
    pub fn new(runner: CommandRunner, store: Arc<dyn SessionStore>, settings: JobSettings) -> Self {
        Self {
            runner,
            store,
            settings,
            registry: Arc::new(Mutex::new(HashMap::new())),
            epoch: Instant::now(),
        }
    }

    /// Supervision timing configuration.
    #[must_use]
    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Start a streamed remote invocation for `session_id`.
    ///
    /// Outward events are delivered in arrival order on `event_tx`;
    /// exactly one terminal event (`claude:result` or `claude:error`) is
    /// emitted per admitted job.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] when a non-terminal job exists for
    ///   the session (admission check and insert are atomic).
    /// - Pool or transport errors from starting the command; the
    ///   registry reservation is rolled back.
    pub async fn start(
        &self,
        session_id: &str,
        command: &str,
        event_tx: mpsc::Sender<OutwardEvent>,
    ) -> Result<()> {
        let job = Arc::new(JobShared {
            session_id: session_id.to_owned(),
            state: StdMutex::new(JobState::Running),
            last_output_ms: AtomicU64::new(self.now_ms()),
            terminal_sent: AtomicBool::new(false),
            cancel_started: AtomicBool::new(false),
            signals: StdMutex::new(None),
            done: CancellationToken::new(),
            relay: EventRelay::new(session_id),
            event_tx,
        });

        // Admission check and placeholder insert under one lock hold, so
        // two concurrent starts for the same session cannot both pass.
        {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(session_id) {
                return Err(AppError::AlreadyRunning(format!(
                    "session {session_id} already has an active job"
                )));
            }
            registry.insert(session_id.to_owned(), Arc::clone(&job));
        }

        let running = match self.runner.run_streamed(command).await {
            Ok(running) => running,
            Err(err) => {
                self.registry.lock().await.remove(session_id);
                return Err(err);
            }
        };

        *job.signals.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(running.signals.clone());

        // A cancel that arrived while the command was still starting found
        // an empty signals slot and was swallowed. Now that the command is
        // wired, honor it: kill the fresh command and finish the job
        // instead of attaching the pump.
        if job.cancel_started.load(Ordering::SeqCst) {
            warn!(session_id, "job was cancelled during startup, killing command");
            running.signals.kill();
            finish_job(
                &job,
                &self.registry,
                fail_state(&job),
                Some("job cancelled during startup".to_owned()),
            )
            .await;
            return Ok(());
        }

        info!(session_id, "job started");

        tokio::spawn(run_pump(
            Arc::clone(&job),
            running,
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.epoch,
        ));

        Ok(())
    }

    /// Cancel the active job for `session_id`, if any.
    ///
    /// Sends an interrupt, then a forced kill when the job has not
    /// reached a terminal state within the grace window; forced kill
    /// removes the registry entry immediately without waiting for the
    /// remote process's own exit notification. No-op for absent or
    /// already-cancelling jobs.
    pub async fn cancel(&self, session_id: &str) {
        let job = self.registry.lock().await.get(session_id).cloned();
        let Some(job) = job else {
            debug!(session_id, "cancel for unknown session ignored");
            return;
        };
        self.begin_cancel(&job);
    }

    /// Session ids with a non-terminal job.
    pub async fn active_sessions(&self) -> Vec<String> {
        self.registry.lock().await.keys().cloned().collect()
    }

    /// Whether `session_id` has a non-terminal job.
    pub async fn is_active(&self, session_id: &str) -> bool {
        self.registry.lock().await.contains_key(session_id)
    }

    /// One watchdog sweep: time out jobs past the idle-output ceiling.
    pub(crate) async fn check_idle_jobs(&self) {
        let ceiling_ms = duration_ms(self.settings.idle_timeout);
        let now = self.now_ms();

        let stale: Vec<Arc<JobShared>> = {
            let registry = self.registry.lock().await;
            registry
                .values()
                .filter(|job| {
                    job.state() == JobState::Running
                        && now.saturating_sub(job.last_output_ms.load(Ordering::SeqCst))
                            > ceiling_ms
                })
                .cloned()
                .collect()
        };

        for job in stale {
            warn!(
                session_id = %job.session_id,
                idle_ceiling = ?self.settings.idle_timeout,
                "job produced no output past the idle ceiling, timing out"
            );
            job.set_state(JobState::TimedOut);
            if job.claim_terminal() {
                let event = job.relay.error(format!(
                    "remote command timed out (no output for {:?})",
                    self.settings.idle_timeout
                ));
                let _ = job.event_tx.send(event).await;
            }
            self.begin_cancel(&job);
        }
    }

    /// Run the interrupt-then-kill sequence for a job, at most once.
    fn begin_cancel(&self, job: &Arc<JobShared>) {
        if job
            .cancel_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(session_id = %job.session_id, "cancellation already in progress");
            return;
        }

        if job.state() == JobState::Running {
            job.set_state(JobState::Cancelling);
        }

        info!(session_id = %job.session_id, "sending interrupt to remote command");
        job.signal_interrupt();

        let job = Arc::clone(job);
        let registry = Arc::clone(&self.registry);
        let grace = self.settings.cancel_grace;
        tokio::spawn(async move {
            tokio::select! {
                () = job.done.cancelled() => {
                    debug!(session_id = %job.session_id, "job finished within the grace window");
                }
                () = tokio::time::sleep(grace) => {
                    if job.has_signals() {
                        warn!(
                            session_id = %job.session_id,
                            "grace window expired, forcing kill and dropping job"
                        );
                        job.signal_kill();
                        registry.lock().await.remove(&job.session_id);
                    } else {
                        // The command has not started yet, so there is
                        // nothing to kill and the registry entry must keep
                        // blocking new starts: the start path observes the
                        // cancel flag once the command is wired and
                        // finishes the job itself.
                        debug!(
                            session_id = %job.session_id,
                            "grace window expired before the command started"
                        );
                    }
                }
            }
        });
    }

    fn now_ms(&self) -> u64 {
        duration_ms(self.epoch.elapsed())
    }
}

impl std::fmt::Debug for JobSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSupervisor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Pump task ────────────────────────────────────────────────────────────────

/// Consume command events, decode, relay, and drive terminal transitions.
async fn run_pump(
    job: Arc<JobShared>,
    mut running: RunningCommand,
    registry: JobRegistry,
    store: Arc<dyn SessionStore>,
    epoch: Instant,
) {
    let mut decoder = LineDecoder::new();
    let mut token_persisted = false;

    loop {
        match running.events.recv().await {
            Some(CommandEvent::Data(chunk)) => {
                job.last_output_ms
                    .store(duration_ms(epoch.elapsed()), Ordering::SeqCst);
                for msg in decoder.feed(&chunk) {
                    relay_message(&job, &store, &mut token_persisted, msg).await;
                }
            }
            Some(CommandEvent::Closed(code)) => {
                for msg in decoder.finish() {
                    relay_message(&job, &store, &mut token_persisted, msg).await;
                }
                finish_job(&job, &registry, close_state(&job, code), code_error(code)).await;
                return;
            }
            Some(CommandEvent::Failed(msg)) => {
                finish_job(&job, &registry, fail_state(&job), Some(msg)).await;
                return;
            }
            None => {
                finish_job(
                    &job,
                    &registry,
                    fail_state(&job),
                    Some("command stream ended unexpectedly".to_owned()),
                )
                .await;
                return;
            }
        }
    }
}

/// Forward one decoded message, persisting the first session token seen.
async fn relay_message(
    job: &Arc<JobShared>,
    store: &Arc<dyn SessionStore>,
    token_persisted: &mut bool,
    msg: StreamMessage,
) {
    if let StreamMessage::SystemInit { session_token, .. } = &msg {
        if !*token_persisted {
            *token_persisted = true;
            persist_token(store, &job.session_id, session_token.clone());
        }
    }

    let terminal = matches!(msg, StreamMessage::Result(_));
    if terminal && !job.claim_terminal() {
        debug!(
            session_id = %job.session_id,
            "dropping late terminal message, terminal event already emitted"
        );
        return;
    }

    let event = job.relay.adapt(msg);
    if job.event_tx.send(event).await.is_err() {
        debug!(session_id = %job.session_id, "event sink closed, dropping event");
    }
}

/// Record the remote session token against the idea, fire-and-forget.
///
/// A failed write is logged and never fails the stream.
fn persist_token(store: &Arc<dyn SessionStore>, session_id: &str, token: String) {
    let store = Arc::clone(store);
    let session_id = session_id.to_owned();
    tokio::spawn(async move {
        if let Err(err) = store.update(&session_id, SessionPatch::token(token)).await {
            warn!(%err, session_id, "failed to persist remote session token");
        }
    });
}

/// Terminal state for a graceful close, honoring an earlier timeout.
fn close_state(job: &JobShared, code: i32) -> JobState {
    match job.state() {
        JobState::TimedOut => JobState::TimedOut,
        _ if code == 0 => JobState::Completed,
        _ => JobState::Failed,
    }
}

/// Terminal state for a transport failure, honoring an earlier timeout.
fn fail_state(job: &JobShared) -> JobState {
    if job.state() == JobState::TimedOut {
        JobState::TimedOut
    } else {
        JobState::Failed
    }
}

/// Fallback terminal-event text for a close without a `result` record.
fn code_error(code: i32) -> Option<String> {
    if code == 0 {
        Some("stream closed without a terminal result".to_owned())
    } else {
        Some(format!("remote command exited with code {code}"))
    }
}

/// Apply the terminal transition: state, terminal event, registry removal.
async fn finish_job(
    job: &Arc<JobShared>,
    registry: &JobRegistry,
    state: JobState,
    error: Option<String>,
) {
    job.set_state(state);

    if let Some(error) = error {
        if job.claim_terminal() {
            let _ = job.event_tx.send(job.relay.error(error)).await;
        }
    }

    registry.lock().await.remove(&job.session_id);
    job.done.cancel();
    info!(session_id = %job.session_id, ?state, "job reached terminal state");
}
