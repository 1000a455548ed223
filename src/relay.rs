//! Outward event protocol adapter.
//!
//! Maps decoded [`StreamMessage`]s to the events consumed by the
//! client-facing relay (e.g. a websocket fan-out), tagging each with the
//! owning idea id. Pure pass-through: delivery order equals decode order
//! equals transport arrival order.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::message::StreamMessage;

/// Outward-facing event record, serialized with a `type` tag.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum OutwardEvent {
    /// Stream opened; carries the resumable remote session token.
    #[serde(rename = "claude:system")]
    #[serde(rename_all = "camelCase")]
    System {
        /// Owning idea id.
        idea_id: String,
        /// Remote session token.
        session_id: String,
        /// Model identifier.
        model: String,
    },
    /// Incremental natural-language output.
    #[serde(rename = "claude:text")]
    #[serde(rename_all = "camelCase")]
    Text {
        /// Owning idea id.
        idea_id: String,
        /// Text fragment.
        text: String,
    },
    /// The agent invoked a capability.
    #[serde(rename = "claude:tool_use")]
    #[serde(rename_all = "camelCase")]
    ToolUse {
        /// Owning idea id.
        idea_id: String,
        /// Invocation correlation id.
        tool_use_id: String,
        /// Capability name.
        name: String,
        /// String-keyed invocation input.
        input: Map<String, Value>,
    },
    /// Result of a prior tool invocation.
    #[serde(rename = "claude:tool_result")]
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Owning idea id.
        idea_id: String,
        /// Invocation correlation id.
        tool_use_id: String,
        /// Result content.
        content: String,
    },
    /// Terminal outcome of the invocation.
    #[serde(rename = "claude:result")]
    #[serde(rename_all = "camelCase")]
    Result {
        /// Owning idea id.
        idea_id: String,
        /// Result text on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Error text on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Remote session token.
        session_id: String,
        /// Invocation cost in USD.
        cost_usd: f64,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
        /// Conversation turns consumed.
        turns: u32,
    },
    /// Job-level failure (transport error, timeout, startup failure).
    #[serde(rename = "claude:error")]
    #[serde(rename_all = "camelCase")]
    Error {
        /// Owning idea id.
        idea_id: String,
        /// Human-readable failure description.
        error: String,
    },
}

impl OutwardEvent {
    /// Whether this event is terminal for its job.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

/// Adapts decoded stream messages to outward events for one session.
#[derive(Debug, Clone)]
pub struct EventRelay {
    idea_id: String,
}

impl EventRelay {
    /// Create a relay bound to the owning idea id.
    #[must_use]
    pub fn new(idea_id: impl Into<String>) -> Self {
        Self {
            idea_id: idea_id.into(),
        }
    }

    /// Map one decoded message to its outward event.
    #[must_use]
    pub fn adapt(&self, msg: StreamMessage) -> OutwardEvent {
        match msg {
            StreamMessage::SystemInit {
                session_token,
                model,
            } => OutwardEvent::System {
                idea_id: self.idea_id.clone(),
                session_id: session_token,
                model,
            },
            StreamMessage::AssistantText { text } => OutwardEvent::Text {
                idea_id: self.idea_id.clone(),
                text,
            },
            StreamMessage::ToolUse {
                tool_use_id,
                name,
                input,
            } => OutwardEvent::ToolUse {
                idea_id: self.idea_id.clone(),
                tool_use_id,
                name,
                input,
            },
            StreamMessage::ToolResult {
                tool_use_id,
                content,
            } => OutwardEvent::ToolResult {
                idea_id: self.idea_id.clone(),
                tool_use_id,
                content,
            },
            StreamMessage::Result(outcome) => OutwardEvent::Result {
                idea_id: self.idea_id.clone(),
                result: outcome.result,
                error: outcome.error,
                session_id: outcome.session_token,
                cost_usd: outcome.cost_usd,
                duration_ms: outcome.duration_ms,
                turns: outcome.turns,
            },
        }
    }

    /// Build a job-level error event for this session.
    #[must_use]
    pub fn error(&self, error: impl Into<String>) -> OutwardEvent {
        OutwardEvent::Error {
            idea_id: self.idea_id.clone(),
            error: error.into(),
        }
    }
}
