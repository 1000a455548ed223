//! Idea session records at the persistence collaborator boundary.
//!
//! Durable storage of ideas lives outside this crate; the core only needs
//! enough of the record to resume a remote conversation and to advance the
//! idea's lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an idea.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    /// Captured but no conversation started yet.
    Captured,
    /// Operator is conversing about the idea.
    Chatting,
    /// A remote build is in progress.
    Building,
    /// A build completed.
    Built,
}

/// Idea session record as exposed by the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IdeaSession {
    /// Unique record identifier (the logical session id for jobs).
    pub id: String,
    /// Filesystem-safe slug used for the remote project directory.
    pub slug: String,
    /// Remote agent session token, once known.
    pub session_token: Option<String>,
    /// Current lifecycle status.
    pub status: IdeaStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl IdeaSession {
    /// Construct a freshly captured idea with a generated identifier.
    #[must_use]
    pub fn new(slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            slug,
            session_token: None,
            status: IdeaStatus::Captured,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied to an idea session record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    /// New remote session token, if learned.
    pub session_token: Option<String>,
    /// New lifecycle status, if changed.
    pub status: Option<IdeaStatus>,
}

impl SessionPatch {
    /// Patch that records a freshly observed remote session token.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            status: None,
        }
    }

    /// Patch that advances the lifecycle status.
    #[must_use]
    pub fn status(status: IdeaStatus) -> Self {
        Self {
            session_token: None,
            status: Some(status),
        }
    }
}
