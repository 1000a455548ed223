//! Session persistence collaborator boundary.
//!
//! Durable idea storage lives outside this crate; the core reads a
//! session record to resume a remote conversation and writes back the
//! session token and lifecycle status. [`MemorySessionStore`] backs the
//! binary and the test suites.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::session::{IdeaSession, SessionPatch};
use crate::{AppError, Result};

/// Read/patch access to idea session records.
pub trait SessionStore: Send + Sync {
    /// Fetch a session record by id, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] on storage failure.
    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdeaSession>>> + Send + '_>>;

    /// Apply a partial update and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when no record exists for `id`, or
    /// [`AppError::Io`] on storage failure.
    fn update(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Pin<Box<dyn Future<Output = Result<IdeaSession>> + Send + '_>>;
}

/// In-memory session store keyed by idea id.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, IdeaSession>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record (setup helper for the binary and tests).
    pub async fn insert(&self, session: IdeaSession) {
        self.records
            .lock()
            .await
            .insert(session.id.clone(), session);
    }
}

impl SessionStore for MemorySessionStore {
    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdeaSession>>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move { Ok(self.records.lock().await.get(&id).cloned()) })
    }

    fn update(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Pin<Box<dyn Future<Output = Result<IdeaSession>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let mut records = self.records.lock().await;
            let session = records
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("idea {id} not found")))?;

            if let Some(token) = patch.session_token {
                session.session_token = Some(token);
            }
            if let Some(status) = patch.status {
                session.status = status;
            }
            session.updated_at = Utc::now();

            Ok(session.clone())
        })
    }
}
