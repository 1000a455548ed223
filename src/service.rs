//! High-level idea operations: chat, build, cancel.
//!
//! Thin orchestration over the supervisor: resolves the idea record,
//! constructs the agent command (resuming the remote session when a token
//! is known), advances the idea's lifecycle status, and starts the job
//! keyed by the idea id.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::command::{escape_ansi_c, ClaudeCommand};
use crate::config::AgentConfig;
use crate::models::session::{IdeaSession, IdeaStatus, SessionPatch};
use crate::relay::OutwardEvent;
use crate::runner::CommandRunner;
use crate::store::SessionStore;
use crate::supervisor::JobSupervisor;
use crate::{AppError, Result};

/// Orchestrates agent invocations for ideas.
pub struct AgentService {
    supervisor: Arc<JobSupervisor>,
    runner: CommandRunner,
    store: Arc<dyn SessionStore>,
    agent: AgentConfig,
}

impl AgentService {
    /// Create a service over the shared supervisor, runner, and store.
    #[must_use]
    pub fn new(
        supervisor: Arc<JobSupervisor>,
        runner: CommandRunner,
        store: Arc<dyn SessionStore>,
        agent: AgentConfig,
    ) -> Self {
        Self {
            supervisor,
            runner,
            store,
            agent,
        }
    }

    /// Start a streamed chat invocation about an idea.
    ///
    /// Chat runs with the configured read-only tool allowlist and resumes
    /// the remote session when a token is already recorded.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] when the idea does not exist.
    /// - [`AppError::AlreadyRunning`] when the idea has an active job.
    /// - Pool, transport, or store errors from starting the job.
    pub async fn chat(
        &self,
        idea_id: &str,
        message: &str,
        event_tx: mpsc::Sender<OutwardEvent>,
    ) -> Result<()> {
        let idea = self.get_idea(idea_id).await?;

        let mut command = ClaudeCommand::new(&self.agent.binary, message)
            .allowed_tools(&self.agent.chat_tools);
        if let Some(token) = &idea.session_token {
            command = command.resume(token);
        }

        if idea.status == IdeaStatus::Captured {
            self.store
                .update(idea_id, SessionPatch::status(IdeaStatus::Chatting))
                .await?;
        }

        self.supervisor
            .start(idea_id, &command.build(), event_tx)
            .await
    }

    /// Start a streamed build invocation inside the idea's project dir.
    ///
    /// Ensures the remote project directory exists first (buffered
    /// `mkdir -p`), then runs the agent with full tool access in that
    /// directory.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] when the idea does not exist.
    /// - [`AppError::CommandFailed`] when the directory cannot be created.
    /// - [`AppError::AlreadyRunning`] when the idea has an active job.
    /// - Pool, transport, or store errors from starting the job.
    pub async fn build(
        &self,
        idea_id: &str,
        instructions: &str,
        event_tx: mpsc::Sender<OutwardEvent>,
    ) -> Result<()> {
        let idea = self.get_idea(idea_id).await?;

        let project_dir = format!("{}/{}/project", self.agent.ideas_base_path, idea.slug);
        self.runner
            .run_buffered(&format!("mkdir -p {}", escape_ansi_c(&project_dir)))
            .await?;

        let mut command =
            ClaudeCommand::new(&self.agent.binary, instructions).project_dir(&project_dir);
        if let Some(token) = &idea.session_token {
            command = command.resume(token);
        }

        self.store
            .update(idea_id, SessionPatch::status(IdeaStatus::Building))
            .await?;

        self.supervisor
            .start(idea_id, &command.build(), event_tx)
            .await
    }

    /// Cancel the idea's active job, if any.
    pub async fn cancel(&self, idea_id: &str) {
        self.supervisor.cancel(idea_id).await;
    }

    async fn get_idea(&self, idea_id: &str) -> Result<IdeaSession> {
        self.store
            .get(idea_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("idea {idea_id} not found")))
    }
}

impl std::fmt::Debug for AgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentService")
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}
