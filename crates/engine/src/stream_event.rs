//! Engine-level streaming events.
//!
//! `StreamEvent` wraps provider-level stream items into the events a host
//! can forward to clients over SSE or WebSocket:
//! - `chunk`      — partial assistant text
//! - `tool_calls` — the model's tool-call batch for the current turn
//! - `error`      — terminal; no further events follow
//! - `end`        — terminal; carries the final result, always last on success

use serde::Serialize;

use axon_core::agent::AgentResult;
use axon_core::error::EngineError;
use axon_core::message::ToolCall;

/// Events emitted by the engine during streaming execution.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial assistant text, forwarded in upstream order.
    Chunk { content: String },

    /// The aggregated tool-call batch for the turn, emitted once per turn
    /// after the upstream response closes.
    ToolCalls { tool_calls: Vec<ToolCall> },

    /// Terminal failure. Serializes the error as `{code, message}`.
    Error { error: EngineError },

    /// Terminal success with the accumulated result.
    End { result: AgentResult },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCalls { .. } => "tool_calls",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
        }
    }
}
