//! Tool-call execution, shared by the blocking and streaming paths.
//!
//! Every call in a batch produces an intermediate step: a successful
//! observation, a failure note, or a not-found note. Failures never abort
//! the batch. The result cache is consulted and populated only when
//! `enable_tool_retry` is on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use axon_core::agent::{AgentConfig, ToolActionStep, ToolCallData, ToolCallRequest};
use axon_core::error::ToolError;
use axon_core::message::ToolCall;
use axon_core::tool::Tool;

use crate::cache::{CachedResult, ToolCache};

/// Longest observation text fed back to the model.
pub(crate) const MAX_OBSERVATION_LEN: usize = 500;

pub(crate) struct BatchOutcome {
    /// Calls that reached a registered tool, in execution order
    pub requests: Vec<ToolCallRequest>,
    /// One step per issued call, success or failure
    pub steps: Vec<ToolCallData>,
}

pub(crate) async fn run_batch(
    calls: &[ToolCall],
    tools_by_name: &HashMap<String, Arc<dyn Tool>>,
    cache: &ToolCache,
    config: &AgentConfig,
    cancel: &CancellationToken,
) -> BatchOutcome {
    let mut requests = Vec::with_capacity(calls.len());
    let mut steps = Vec::with_capacity(calls.len());

    for call in calls {
        let name = call.function.name.as_str();
        let Some(tool) = tools_by_name.get(name) else {
            warn!(tool = %name, "model requested unknown tool");
            steps.push(failure_step(call, format!("Tool {name} not found")));
            continue;
        };

        let started = Instant::now();
        let cached = if config.enable_tool_retry {
            cache.get(name, &call.function.arguments)
        } else {
            None
        };

        let (outcome, was_cached) = match cached {
            Some(entry) => (entry, true),
            None => {
                let executed: CachedResult = execute_with_timeout(
                    tool.as_ref(),
                    call,
                    config.tool_call_timeout,
                    cancel,
                )
                .await
                .map_err(|e| e.to_string());
                if config.enable_tool_retry {
                    cache.insert(name, &call.function.arguments, executed.clone());
                }
                (executed, false)
            }
        };

        match outcome {
            Ok(value) => {
                debug!(
                    tool = %name,
                    cached = was_cached,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "tool executed"
                );
                requests.push(ToolCallRequest::from(call));
                steps.push(ToolCallData {
                    action: ToolActionStep::from(call),
                    observation: truncate(&render_value(&value), MAX_OBSERVATION_LEN),
                });
            }
            Err(message) => {
                warn!(
                    tool = %name,
                    error = %message,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "tool execution failed"
                );
                steps.push(failure_step(call, format!("Tool execution failed: {message}")));
            }
        }
    }

    BatchOutcome { requests, steps }
}

async fn execute_with_timeout(
    tool: &dyn Tool,
    call: &ToolCall,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Value, ToolError> {
    let name = call.function.name.clone();
    let fut = tool.execute(call.function.arguments.clone());
    tokio::select! {
        _ = cancel.cancelled() => Err(ToolError::ExecutionFailed {
            tool_name: name.clone(),
            reason: "cancelled".into(),
        }),
        result = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                    Err(ToolError::Timeout {
                        tool_name: name.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }),
                None => fut.await,
            }
        } => result,
    }
}

fn failure_step(call: &ToolCall, observation: String) -> ToolCallData {
    ToolCallData {
        action: ToolActionStep::from(call),
        observation,
    }
}

/// Textual form of a tool result: strings verbatim, everything else as JSON.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cap a string at `max_len` characters, appending `...` when cut.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max_len).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AddTool {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "Adds two numbers"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            arguments: serde_json::Map<String, Value>,
        ) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let a = arguments.get("a").and_then(Value::as_i64).unwrap_or(0);
            let b = arguments.get("b").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Map<String, Value>,
        ) -> Result<Value, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "fail".into(),
                reason: "nope".into(),
            })
        }
    }

    fn registry(tools: Vec<Arc<dyn Tool>>) -> HashMap<String, Arc<dyn Tool>> {
        tools.into_iter().map(|t| (t.name().to_string(), t)).collect()
    }

    fn add_call(id: &str) -> ToolCall {
        ToolCall::new(
            id,
            "add",
            axon_core::message::ToolFunction::parse_arguments(r#"{"a": 2, "b": 3}"#),
        )
    }

    #[tokio::test]
    async fn successful_call_yields_observation() {
        let tools = registry(vec![Arc::new(AddTool {
            calls: AtomicUsize::new(0),
        })]);
        let cache = ToolCache::new(10);
        let config = AgentConfig::default();
        let cancel = CancellationToken::new();

        let outcome = run_batch(&[add_call("call_1")], &tools, &cache, &config, &cancel).await;
        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].observation, "5");
    }

    #[tokio::test]
    async fn failure_is_captured_and_batch_continues() {
        let tools = registry(vec![
            Arc::new(AddTool {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(FailTool),
        ]);
        let cache = ToolCache::new(10);
        let config = AgentConfig::default();
        let cancel = CancellationToken::new();

        let fail = ToolCall::new("call_f", "fail", serde_json::Map::new());
        let outcome =
            run_batch(&[fail, add_call("call_1")], &tools, &cache, &config, &cancel).await;
        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps[0]
            .observation
            .starts_with("Tool execution failed:"));
        assert_eq!(outcome.steps[1].observation, "5");
    }

    #[tokio::test]
    async fn missing_tool_records_failure_step() {
        let tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        let cache = ToolCache::new(10);
        let config = AgentConfig::default();
        let cancel = CancellationToken::new();

        let ghost = ToolCall::new("call_g", "ghost", serde_json::Map::new());
        let outcome = run_batch(&[ghost], &tools, &cache, &config, &cancel).await;
        assert!(outcome.requests.is_empty());
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].observation, "Tool ghost not found");
    }

    #[tokio::test]
    async fn identical_calls_hit_cache_when_retry_enabled() {
        let add = Arc::new(AddTool {
            calls: AtomicUsize::new(0),
        });
        let tools = registry(vec![add.clone()]);
        let cache = ToolCache::new(10);
        let config = AgentConfig {
            enable_tool_retry: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let outcome = run_batch(
            &[add_call("call_1"), add_call("call_2")],
            &tools,
            &cache,
            &config,
            &cancel,
        )
        .await;
        assert_eq!(add.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(outcome.steps[0].observation, "5");
        assert_eq!(outcome.steps[1].observation, "5");
    }

    #[tokio::test]
    async fn cache_is_bypassed_when_retry_disabled() {
        let add = Arc::new(AddTool {
            calls: AtomicUsize::new(0),
        });
        let tools = registry(vec![add.clone()]);
        let cache = ToolCache::new(10);
        let config = AgentConfig::default();
        let cancel = CancellationToken::new();

        run_batch(
            &[add_call("call_1"), add_call("call_2")],
            &tools,
            &cache,
            &config,
            &cancel,
        )
        .await;
        assert_eq!(add.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        struct SlowTool;

        #[async_trait]
        impl Tool for SlowTool {
            fn name(&self) -> &str {
                "slow"
            }
            fn description(&self) -> &str {
                "Sleeps"
            }
            fn schema(&self) -> Value {
                json!({"type": "object"})
            }
            async fn execute(
                &self,
                _arguments: serde_json::Map<String, Value>,
            ) -> Result<Value, ToolError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            }
        }

        let tools = registry(vec![Arc::new(SlowTool)]);
        let cache = ToolCache::new(10);
        let config = AgentConfig {
            tool_call_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let call = ToolCall::new("call_s", "slow", serde_json::Map::new());
        let outcome = run_batch(&[call], &tools, &cache, &config, &cancel).await;
        assert!(outcome.requests.is_empty());
        assert!(outcome.steps[0].observation.contains("timed out"));
    }

    #[test]
    fn truncate_caps_and_marks() {
        assert_eq!(truncate("short", 10), "short");
        let long = "x".repeat(600);
        let cut = truncate(&long, MAX_OBSERVATION_LEN);
        assert_eq!(cut.chars().count(), MAX_OBSERVATION_LEN + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn render_strings_without_quotes() {
        assert_eq!(render_value(&json!("hello")), "hello");
        assert_eq!(render_value(&json!(5)), "5");
        assert_eq!(render_value(&json!({"k": 1})), r#"{"k":1}"#);
    }
}
