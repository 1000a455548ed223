//! Typed stream protocol messages emitted by the remote agent.
//!
//! The agent writes one JSON record per line on stdout/stderr
//! (`--output-format stream-json`). Records are discriminated by a
//! `(type, subtype)` pair; [`StreamMessage`] is the decoded form produced
//! by the line decoder and consumed by the event relay.

use serde_json::{Map, Value};

/// One decoded record from the agent's line-delimited stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// `(system, init)` — stream start; the token is used to resume the
    /// remote conversation later.
    SystemInit {
        /// Remote session token.
        session_token: String,
        /// Model identifier reported by the agent.
        model: String,
    },
    /// `(assistant, text)` — incremental natural-language output.
    AssistantText {
        /// Text fragment.
        text: String,
    },
    /// `(assistant, tool_use)` — the agent invoked a capability.
    ToolUse {
        /// Correlation id for the invocation.
        tool_use_id: String,
        /// Capability name.
        name: String,
        /// String-keyed invocation input.
        input: Map<String, Value>,
    },
    /// `(tool_result, _)` — result of a prior tool invocation.
    ToolResult {
        /// Correlation id matching the originating `ToolUse`.
        tool_use_id: String,
        /// Result content.
        content: String,
    },
    /// `(result, success|error)` — terminal outcome of the invocation.
    Result(CommandOutcome),
}

/// Terminal outcome payload of a `(result, _)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Result text when the invocation succeeded.
    pub result: Option<String>,
    /// Error text when the invocation failed.
    pub error: Option<String>,
    /// Remote session token for resuming.
    pub session_token: String,
    /// Invocation cost in USD.
    pub cost_usd: f64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Number of conversation turns consumed.
    pub turns: u32,
}

impl CommandOutcome {
    /// Whether the remote invocation reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
