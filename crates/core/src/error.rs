//! Error types for the Axon domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error type; [`EngineError`] is the engine's public surface
//! and carries a stable machine-readable code alongside the human message.

use thiserror::Error;

/// Failures surfaced by the agent engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Execute/ExecuteStream invoked while an execution is in progress.
    #[error("agent is already running")]
    AgentBusy,

    /// Building the initial message list failed.
    #[error("failed to prepare messages: {source}")]
    PrepareMessages {
        #[source]
        source: Box<EngineError>,
    },

    /// Loading chat history from the memory provider failed.
    #[error("failed to get chat history: {source}")]
    MemoryHistory {
        #[source]
        source: MemoryError,
    },

    /// The blocking model call failed.
    #[error("failed to chat with tools: {source}")]
    Chat {
        #[source]
        source: ProviderError,
    },

    /// The streaming model call failed to start.
    #[error("failed to chat with tools in stream: {source}")]
    StreamChat {
        #[source]
        source: ProviderError,
    },

    /// An error item arrived mid-stream.
    #[error("stream error occurred: {0}")]
    Stream(String),

    /// The streaming worker panicked.
    #[error("panic in stream execution: {0}")]
    StreamPanic(String),

    /// A blocking iteration failed beyond recovery.
    #[error("iteration {iteration} failed: {source}")]
    Iteration {
        iteration: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// A streaming iteration failed beyond recovery.
    #[error("stream iteration {iteration} failed: {source}")]
    StreamIteration {
        iteration: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// The tool dependency graph has a cycle.
    #[error("circular dependency detected involving tool '{0}'")]
    CircularDependency(String),

    /// The model requested a tool that is not registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
}

impl EngineError {
    /// Stable error code for transports and logs. Codes never change even
    /// when messages are reworded.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentBusy => "AGENT_BUSY",
            Self::PrepareMessages { .. } => "PREPARE_MESSAGES_FAILED",
            Self::MemoryHistory { .. } => "MEMORY_HISTORY_FAILED",
            Self::Chat { .. } => "CHAT_FAILED",
            Self::StreamChat { .. } => "STREAM_CHAT_FAILED",
            Self::Stream(_) => "STREAM_ERROR",
            Self::StreamPanic(_) => "STREAM_PANIC",
            Self::Iteration { .. } => "ITERATION_FAILED",
            Self::StreamIteration { .. } => "STREAM_ITERATION_FAILED",
            Self::CircularDependency(_) => "CIRCULAR_DEPENDENCY",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
        }
    }
}

// Serialized as `{code, message}` so stream events can carry typed errors
// over the wire without exposing the full source chain.
impl serde::Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("EngineError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Failures from LLM provider backends.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("rate limited by provider, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("no response content")]
    NoResponse,

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),
}

/// Failures from tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures from memory providers.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("memory compression failed: {0}")]
    Compression(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::AgentBusy.code(), "AGENT_BUSY");
        assert_eq!(
            EngineError::CircularDependency("a".into()).code(),
            "CIRCULAR_DEPENDENCY"
        );
        assert_eq!(
            EngineError::Iteration {
                iteration: 3,
                source: Box::new(EngineError::Chat {
                    source: ProviderError::NoResponse,
                }),
            }
            .code(),
            "ITERATION_FAILED"
        );
    }

    #[test]
    fn wrapped_errors_keep_their_cause_in_the_message() {
        let err = EngineError::PrepareMessages {
            source: Box::new(EngineError::MemoryHistory {
                source: MemoryError::Storage("disk full".into()),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("prepare messages"));
        assert!(text.contains("chat history"));
    }

    #[test]
    fn engine_error_serializes_code_and_message() {
        let err = EngineError::StreamPanic("boom".into());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains(r#""code":"STREAM_PANIC""#));
        assert!(json.contains("boom"));
    }
}
