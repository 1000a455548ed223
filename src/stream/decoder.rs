//! Stateful decoder turning raw byte chunks into [`StreamMessage`]s.
//!
//! The remote agent interleaves protocol records with progress text and
//! the transport delivers bytes at arbitrary boundaries, so decoding is
//! best-effort by design: lines that fail to parse, carry an unknown
//! `(type, subtype)` discriminator, or exceed the frame limit are dropped
//! and decoding continues. Only complete lines are parsed; the trailing
//! fragment is buffered byte-for-byte across [`feed`](LineDecoder::feed)
//! calls, so chunk splits mid-line or mid-multibyte-character are safe.

use bytes::BytesMut;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::models::message::{CommandOutcome, StreamMessage};
use crate::stream::codec::StreamCodec;

/// Stateful byte-chunk-to-message decoder. One instance per active stream.
#[derive(Debug, Default)]
pub struct LineDecoder {
    codec: StreamCodec,
    buf: BytesMut,
}

impl LineDecoder {
    /// Create a decoder with an empty tail buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw output, returning every message completed by it.
    ///
    /// Pure synchronous transform; never blocks and never fails — frame
    /// and parse errors are logged at `debug` and skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamMessage> {
        self.buf.extend_from_slice(chunk);
        let mut messages = Vec::new();

        loop {
            match self.codec.decode(&mut self.buf) {
                Ok(Some(line)) => {
                    if let Some(msg) = parse_stream_line(&line) {
                        messages.push(msg);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(%err, "stream decode: skipping oversized frame");
                }
            }
        }

        messages
    }

    /// Drain the trailing unterminated line at end of stream, if any.
    pub fn finish(&mut self) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        while let Ok(Some(line)) = self.codec.decode_eof(&mut self.buf) {
            if let Some(msg) = parse_stream_line(&line) {
                messages.push(msg);
            }
        }
        messages
    }
}

// ── Wire envelope ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(flatten)]
    rest: Value,
}

#[derive(Debug, Deserialize)]
struct SystemInitParams {
    session_id: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TextParams {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ToolUseParams {
    tool_use_id: String,
    name: String,
    input: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ToolResultParams {
    tool_use_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ResultParams {
    result: Option<String>,
    error: Option<String>,
    session_id: String,
    cost_usd: f64,
    duration_ms: u64,
    turns: u32,
}

/// Parse one trimmed stream line into a [`StreamMessage`].
///
/// Returns `None` for empty lines, non-JSON lines, unknown discriminators,
/// and records with missing fields — all silently skipped so a single bad
/// line never aborts the stream.
#[must_use]
pub fn parse_stream_line(line: &str) -> Option<StreamMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let envelope: Envelope = match serde_json::from_str(trimmed) {
        Ok(env) => env,
        Err(err) => {
            debug!(%err, "stream decode: skipping non-JSON line");
            return None;
        }
    };

    let subtype = envelope.subtype.as_deref().unwrap_or_default();
    let parsed = match (envelope.kind.as_str(), subtype) {
        ("system", "init") => serde_json::from_value::<SystemInitParams>(envelope.rest)
            .map(|p| StreamMessage::SystemInit {
                session_token: p.session_id,
                model: p.model,
            })
            .map_err(|e| ("system/init", e)),
        ("assistant", "text") => serde_json::from_value::<TextParams>(envelope.rest)
            .map(|p| StreamMessage::AssistantText { text: p.text })
            .map_err(|e| ("assistant/text", e)),
        ("assistant", "tool_use") => serde_json::from_value::<ToolUseParams>(envelope.rest)
            .map(|p| StreamMessage::ToolUse {
                tool_use_id: p.tool_use_id,
                name: p.name,
                input: p.input,
            })
            .map_err(|e| ("assistant/tool_use", e)),
        ("tool_result", _) => serde_json::from_value::<ToolResultParams>(envelope.rest)
            .map(|p| StreamMessage::ToolResult {
                tool_use_id: p.tool_use_id,
                content: p.content,
            })
            .map_err(|e| ("tool_result", e)),
        ("result", "success" | "error") => serde_json::from_value::<ResultParams>(envelope.rest)
            .map(|p| {
                StreamMessage::Result(CommandOutcome {
                    result: p.result,
                    error: p.error,
                    session_token: p.session_id,
                    cost_usd: p.cost_usd,
                    duration_ms: p.duration_ms,
                    turns: p.turns,
                })
            })
            .map_err(|e| ("result", e)),
        (kind, subtype) => {
            debug!(kind, subtype, "stream decode: skipping unknown discriminator");
            return None;
        }
    };

    match parsed {
        Ok(msg) => Some(msg),
        Err((discriminator, err)) => {
            debug!(discriminator, %err, "stream decode: skipping malformed record");
            None
        }
    }
}
