//! Engine configuration and execution result types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ToolCall;

/// Configuration for the agent engine.
///
/// The engine takes a fully populated config value; loading it from files
/// or the environment is the host application's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System message prepended to every conversation (empty = none)
    #[serde(default)]
    pub system_message: String,

    /// Maximum reasoning turns per execution (at least 1)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Most recent history messages loaded from memory (0 = no limit)
    #[serde(default)]
    pub max_history_messages: usize,

    /// Cap on tokens drawn from memory context (0 = no limit)
    #[serde(default)]
    pub max_tokens_from_memory: usize,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Sequences that stop generation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Per-model-call timeout (None = wait indefinitely)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Provider retry attempts on transient failures
    #[serde(default)]
    pub retry_attempts: u32,

    /// Delay between provider retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<Duration>,

    /// Gates the tool-result cache: both reads and writes are bypassed
    /// unless this is on
    #[serde(default)]
    pub enable_tool_retry: bool,

    #[serde(default)]
    pub tool_retry_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_retry_delay: Option<Duration>,

    /// Accepted for future use; tool batches currently run sequentially
    #[serde(default)]
    pub parallel_tool_calls: bool,

    /// Per-tool-call timeout (None = wait indefinitely)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_timeout: Option<Duration>,

    #[serde(default)]
    pub enable_cache: bool,

    /// Tool-result cache capacity
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Compress old history via the LLM after saving a turn
    #[serde(default)]
    pub enable_memory_compress: bool,

    /// History length that triggers compression (0 = never)
    #[serde(default)]
    pub memory_compress_threshold: usize,
}

fn default_max_iterations() -> usize {
    5
}

fn default_cache_size() -> usize {
    100
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_message: String::new(),
            max_iterations: default_max_iterations(),
            max_history_messages: 0,
            max_tokens_from_memory: 0,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: Vec::new(),
            timeout: None,
            retry_attempts: 0,
            retry_delay: None,
            enable_tool_retry: false,
            tool_retry_attempts: 0,
            tool_retry_delay: None,
            parallel_tool_calls: false,
            tool_call_timeout: None,
            enable_cache: false,
            cache_size: default_cache_size(),
            enable_memory_compress: false,
            memory_compress_threshold: 0,
        }
    }
}

/// The final outcome of an engine execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    /// The model's final textual output
    pub output: String,

    /// Every tool call that reached a registered tool, in execution order
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,

    /// One entry per tool call the model issued: the action taken and the
    /// observation (or failure note) produced
    #[serde(default)]
    pub intermediate_steps: Vec<ToolCallData>,
}

/// Audit record of a tool call the engine dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    pub tool_input: serde_json::Map<String, Value>,
    pub tool_call_id: String,
    #[serde(rename = "type")]
    pub call_type: String,
}

impl From<&ToolCall> for ToolCallRequest {
    fn from(call: &ToolCall) -> Self {
        Self {
            tool: call.function.name.clone(),
            tool_input: call.function.arguments.clone(),
            tool_call_id: call.id.clone(),
            call_type: call.call_type.clone(),
        }
    }
}

impl ToolCallRequest {
    /// Mirror this request back into the structured call form, so follow-up
    /// messages can reference the original call.
    pub fn as_call(&self) -> ToolCall {
        ToolCall {
            id: self.tool_call_id.clone(),
            call_type: self.call_type.clone(),
            function: crate::message::ToolFunction {
                name: self.tool.clone(),
                arguments: self.tool_input.clone(),
            },
        }
    }
}

/// The action half of an intermediate step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolActionStep {
    pub tool: String,
    pub tool_input: serde_json::Map<String, Value>,
    pub tool_call_id: String,
    #[serde(rename = "type")]
    pub call_type: String,
}

impl From<&ToolCall> for ToolActionStep {
    fn from(call: &ToolCall) -> Self {
        Self {
            tool: call.function.name.clone(),
            tool_input: call.function.arguments.clone(),
            tool_call_id: call.id.clone(),
            call_type: call.call_type.clone(),
        }
    }
}

/// One intermediate step: a tool action and its textual observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallData {
    pub action: ToolActionStep,
    pub observation: String,
}
