//! The agent engine: orchestration of the reasoning loop.
//!
//! One `AgentEngine` drives one conversation at a time. Configuration,
//! tools, and the memory binding live behind a reader/writer lock; setters
//! take effect on the next iteration and never mutate a turn in progress.
//! A single-flight gate (atomic flag) rejects concurrent executions with
//! `AGENT_BUSY`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use axon_core::agent::{AgentConfig, AgentResult, ToolCallData, ToolCallRequest};
use axon_core::error::{EngineError, ProviderError};
use axon_core::memory::MemoryProvider;
use axon_core::message::{Message, Role, ToolCall};
use axon_core::provider::{LlmProvider, StreamMessage};
use axon_core::tool::{Tool, ToolDefinition};

use crate::cache::ToolCache;
use crate::executor;
use crate::scheduler;
use crate::stream_event::StreamEvent;

/// Buffer size of the streaming output channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 50;

/// Throttle between reasoning turns.
pub const ITERATION_DELAY: Duration = Duration::from_millis(100);

/// The agent engine.
///
/// Owns the model handle, the tool registry, the optional memory binding,
/// and the tool-result cache.
pub struct AgentEngine {
    model: Arc<dyn LlmProvider>,
    state: RwLock<EngineState>,
    running: AtomicBool,
    cancel: CancellationToken,
    cache: ToolCache,
}

struct EngineState {
    config: AgentConfig,
    tools: Vec<Arc<dyn Tool>>,
    tools_by_name: HashMap<String, Arc<dyn Tool>>,
    memory: Option<Arc<dyn MemoryProvider>>,
}

/// Releases the single-flight gate when an execution ends, panics included.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AgentEngine {
    pub fn new(model: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        let cache = ToolCache::new(config.cache_size);
        Self {
            model,
            state: RwLock::new(EngineState {
                config,
                tools: Vec::new(),
                tools_by_name: HashMap::new(),
                memory: None,
            }),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            cache,
        }
    }

    // ---- Execution -------------------------------------------------------

    /// Run the reasoning loop to completion and return the final result.
    ///
    /// `prior_steps` is an optional externally conducted tool-call exchange
    /// folded into the conversation as context.
    pub async fn execute(
        &self,
        input: &str,
        prior_steps: &[ToolCallData],
    ) -> Result<AgentResult, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AgentBusy);
        }
        let _guard = RunGuard(&self.running);

        info!(
            input_len = input.len(),
            prior_steps = prior_steps.len(),
            "starting agent execution"
        );

        let mut messages = self
            .prepare_messages(input, prior_steps)
            .await
            .map_err(|e| EngineError::PrepareMessages {
                source: Box::new(e),
            })?;

        let mut output = String::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut intermediate_steps: Vec<ToolCallData> = Vec::new();

        let mut iteration = 0usize;
        loop {
            let max_iterations = self.max_iterations();
            if iteration >= max_iterations {
                info!(max_iterations, "reached maximum iteration limit");
                break;
            }

            debug!(
                iteration = iteration + 1,
                max_iterations, "starting iteration"
            );
            let (turn, continue_iterating) = self
                .run_iteration(&messages, iteration, max_iterations)
                .await
                .map_err(|e| EngineError::Iteration {
                    iteration,
                    source: Box::new(e),
                })?;

            output = turn.output.clone();
            tool_calls.extend(turn.tool_calls.iter().cloned());
            intermediate_steps.extend(turn.intermediate_steps.iter().cloned());

            if !continue_iterating {
                debug!(iteration = iteration + 1, "execution completed");
                break;
            }

            messages = build_next_messages(&messages, &turn);
            iteration += 1;
            if iteration < max_iterations {
                tokio::time::sleep(ITERATION_DELAY).await;
            }
        }

        let result = AgentResult {
            output,
            tool_calls,
            intermediate_steps,
        };
        self.persist_turn(input, &result.output).await;

        info!(
            total_iterations = iteration + 1,
            output_len = result.output.len(),
            "agent execution completed"
        );
        Ok(result)
    }

    /// Run the reasoning loop, emitting [`StreamEvent`]s as it goes.
    ///
    /// The channel closes when execution terminates; on success the last
    /// event is `End` with the accumulated result. A panic in the worker
    /// surfaces as a single `Error` event with code `STREAM_PANIC`.
    pub fn execute_stream(
        self: &Arc<Self>,
        input: &str,
        prior_steps: &[ToolCallData],
    ) -> Result<mpsc::Receiver<StreamEvent>, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AgentBusy);
        }

        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let engine = Arc::clone(self);
        let input = input.to_string();
        let prior_steps = prior_steps.to_vec();

        tokio::spawn(async move {
            let worker = tokio::spawn({
                let engine = Arc::clone(&engine);
                let tx = tx.clone();
                let input = input.clone();
                async move {
                    engine.run_stream(&input, &prior_steps, &tx).await;
                }
            });

            if let Err(join_err) = worker.await {
                if join_err.is_panic() {
                    let message = panic_message(join_err);
                    error!(panic = %message, "stream worker panicked");
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: EngineError::StreamPanic(message),
                        })
                        .await;
                }
            }
            engine.running.store(false, Ordering::SeqCst);
        });

        Ok(rx)
    }

    async fn run_stream(
        &self,
        input: &str,
        prior_steps: &[ToolCallData],
        tx: &mpsc::Sender<StreamEvent>,
    ) {
        info!(input_len = input.len(), "starting stream execution");

        let mut messages = match self.prepare_messages(input, prior_steps).await {
            Ok(messages) => messages,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        error: EngineError::PrepareMessages {
                            source: Box::new(e),
                        },
                    })
                    .await;
                return;
            }
        };

        let mut output = String::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut intermediate_steps: Vec<ToolCallData> = Vec::new();

        let mut iteration = 0usize;
        loop {
            let max_iterations = self.max_iterations();
            if iteration >= max_iterations {
                info!(max_iterations, "reached maximum iteration limit");
                break;
            }

            debug!(
                iteration = iteration + 1,
                max_iterations, "starting streaming iteration"
            );
            let turn = match self
                .run_stream_iteration(&messages, iteration, max_iterations, tx)
                .await
            {
                Ok(Some(turn)) => turn,
                // Cancelled or the consumer went away: close quietly
                Ok(None) => return,
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: EngineError::StreamIteration {
                                iteration,
                                source: Box::new(e),
                            },
                        })
                        .await;
                    return;
                }
            };

            let (turn, continue_iterating) = turn;
            output = turn.output.clone();
            tool_calls.extend(turn.tool_calls.iter().cloned());
            intermediate_steps.extend(turn.intermediate_steps.iter().cloned());

            if !continue_iterating {
                debug!(iteration = iteration + 1, "stream execution completed");
                break;
            }

            messages = build_next_messages(&messages, &turn);
            iteration += 1;
        }

        let result = AgentResult {
            output,
            tool_calls,
            intermediate_steps,
        };
        self.persist_turn(input, &result.output).await;

        let _ = tx.send(StreamEvent::End { result }).await;
    }

    /// One blocking turn: model call, then (unless this is the last allowed
    /// turn) the scheduled tool batch.
    async fn run_iteration(
        &self,
        messages: &[Message],
        iteration: usize,
        max_iterations: usize,
    ) -> Result<(AgentResult, bool), EngineError> {
        let (config, tools, tools_by_name) = self.tooling_snapshot();
        let definitions: Vec<ToolDefinition> = tools.iter().map(|t| t.definition()).collect();

        let response = self
            .chat_with_timeout(messages.to_vec(), definitions, config.timeout)
            .await?;

        let mut result = AgentResult {
            output: response.text(),
            ..Default::default()
        };

        if response.tool_calls.is_empty() {
            debug!(iteration = iteration + 1, "no tool calls in this iteration");
            return Ok((result, false));
        }

        info!(
            tool_count = response.tool_calls.len(),
            iteration = iteration + 1,
            "model requested tool calls"
        );

        if iteration + 1 >= max_iterations {
            // No subsequent turn could consume the observations; record the
            // calls without executing them.
            info!("reached maximum iterations, skipping tool execution");
            result.tool_calls = response.tool_calls.iter().map(ToolCallRequest::from).collect();
            return Ok((result, false));
        }

        let ordered = self.schedule(&response.tool_calls, &tools_by_name);
        let outcome = executor::run_batch(
            &ordered,
            &tools_by_name,
            &self.cache,
            &config,
            &self.cancel,
        )
        .await;

        result.tool_calls = outcome.requests;
        result.intermediate_steps = outcome.steps;
        let continue_iterating = !result.tool_calls.is_empty();
        Ok((result, continue_iterating))
    }

    /// One streaming turn. Returns `Ok(None)` when execution should stop
    /// without an event (cancellation, consumer gone).
    async fn run_stream_iteration(
        &self,
        messages: &[Message],
        iteration: usize,
        max_iterations: usize,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<Option<(AgentResult, bool)>, EngineError> {
        let (config, tools, tools_by_name) = self.tooling_snapshot();
        let definitions: Vec<ToolDefinition> = tools.iter().map(|t| t.definition()).collect();

        let start = self
            .model
            .chat_with_tools_stream(messages.to_vec(), definitions);
        let started = match config.timeout {
            Some(limit) => tokio::time::timeout(limit, start)
                .await
                .unwrap_or_else(|_| Err(ProviderError::Timeout(format!("{limit:?} elapsed")))),
            None => start.await,
        };
        let mut stream = started.map_err(|source| EngineError::StreamChat { source })?;

        let mut result = AgentResult::default();
        let mut calls: Vec<ToolCall> = Vec::new();

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                item = stream.recv() => item,
            };
            let Some(item) = item else { break };

            match item {
                StreamMessage::Chunk { content } => {
                    result.output.push_str(&content);
                    if tx.send(StreamEvent::Chunk { content }).await.is_err() {
                        return Ok(None);
                    }
                }
                StreamMessage::ToolCalls { tool_calls } => calls.extend(tool_calls),
                StreamMessage::Error { message } => {
                    return Err(EngineError::Stream(message));
                }
                StreamMessage::End => break,
            }
        }

        if calls.is_empty() {
            debug!(iteration = iteration + 1, "no tool calls in this iteration");
            return Ok(Some((result, false)));
        }

        info!(
            tool_count = calls.len(),
            iteration = iteration + 1,
            "model requested tool calls"
        );
        if tx
            .send(StreamEvent::ToolCalls {
                tool_calls: calls.clone(),
            })
            .await
            .is_err()
        {
            return Ok(None);
        }

        if iteration + 1 >= max_iterations {
            info!("reached maximum iterations, skipping tool execution");
            result.tool_calls = calls.iter().map(ToolCallRequest::from).collect();
            return Ok(Some((result, false)));
        }

        let ordered = self.schedule(&calls, &tools_by_name);
        let outcome = executor::run_batch(
            &ordered,
            &tools_by_name,
            &self.cache,
            &config,
            &self.cancel,
        )
        .await;

        result.tool_calls = outcome.requests;
        result.intermediate_steps = outcome.steps;
        let continue_iterating = !result.tool_calls.is_empty();
        Ok(Some((result, continue_iterating)))
    }

    /// Order a batch, falling back to arrival order on a dependency cycle.
    fn schedule(
        &self,
        calls: &[ToolCall],
        tools_by_name: &HashMap<String, Arc<dyn Tool>>,
    ) -> Vec<ToolCall> {
        match scheduler::sort_by_dependencies(calls, tools_by_name) {
            Ok(sorted) => sorted,
            Err(e) => {
                warn!(error = %e, "tool scheduling failed, falling back to arrival order");
                calls.to_vec()
            }
        }
    }

    async fn chat_with_timeout(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        timeout: Option<Duration>,
    ) -> Result<Message, EngineError> {
        let fut = self.model.chat_with_tools(messages, tools);
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            result = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, fut)
                        .await
                        .unwrap_or_else(|_| Err(ProviderError::Timeout(format!("{limit:?} elapsed")))),
                    None => fut.await,
                }
            } => result,
        };
        outcome.map_err(|source| EngineError::Chat { source })
    }

    // ---- Message preparation --------------------------------------------

    /// Assemble the first turn: system message, bounded history, prior
    /// tool-call context, then the user input.
    async fn prepare_messages(
        &self,
        input: &str,
        prior_steps: &[ToolCallData],
    ) -> Result<Vec<Message>, EngineError> {
        let (config, memory) = {
            let state = self.state.read().unwrap();
            (state.config.clone(), state.memory.clone())
        };

        let mut history = match memory {
            Some(memory) => memory
                .get_chat_history()
                .await
                .map_err(|source| EngineError::MemoryHistory { source })?,
            None => Vec::new(),
        };
        if config.max_history_messages > 0 && history.len() > config.max_history_messages {
            history.drain(..history.len() - config.max_history_messages);
        }

        let mut messages = Vec::with_capacity(history.len() + 3);
        if !config.system_message.is_empty() {
            messages.push(Message::system(&config.system_message));
        }
        messages.extend(history);
        if !prior_steps.is_empty() {
            messages.push(Message::system(prior_steps_context(prior_steps)));
        }
        messages.push(Message::user(input));

        Ok(messages)
    }

    // ---- Persistence -----------------------------------------------------

    /// Save the turn to memory and compress old history when due. Neither
    /// failure disturbs a completed result.
    async fn persist_turn(&self, input: &str, output: &str) {
        let (config, memory) = {
            let state = self.state.read().unwrap();
            (state.config.clone(), state.memory.clone())
        };
        let Some(memory) = memory else { return };

        if let Err(e) = memory.save_context(input, output).await {
            warn!(error = %e, "failed to save conversation context");
            return;
        }

        if !config.enable_memory_compress || config.memory_compress_threshold == 0 {
            return;
        }

        match memory.get_chat_history().await {
            Ok(history) if history.len() > config.memory_compress_threshold => {
                match memory
                    .compress(
                        Arc::clone(&self.model),
                        config.memory_compress_threshold,
                    )
                    .await
                {
                    Ok(()) => info!(
                        original_count = history.len(),
                        threshold = config.memory_compress_threshold,
                        "memory compressed"
                    ),
                    Err(e) => warn!(error = %e, "memory compression failed"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read history for compression check"),
        }
    }

    // ---- Configuration and tooling ---------------------------------------

    /// Register a tool. Re-adding by the same name is idempotent: the new
    /// tool replaces the old one at its original list position.
    pub fn add_tool(&self, tool: Arc<dyn Tool>) {
        let mut state = self.state.write().unwrap();
        let name = tool.name().to_string();
        if let Some(existing) = state.tools.iter_mut().find(|t| t.name() == name) {
            *existing = Arc::clone(&tool);
        } else {
            state.tools.push(Arc::clone(&tool));
        }
        state.tools_by_name.insert(name, tool);
    }

    pub fn add_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.add_tool(tool);
        }
    }

    /// Replace the whole tool catalog.
    pub fn set_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        {
            let mut state = self.state.write().unwrap();
            state.tools.clear();
            state.tools_by_name.clear();
        }
        self.add_tools(tools);
    }

    /// Bind a memory provider, applying the configured history cap.
    pub fn set_memory(&self, memory: Arc<dyn MemoryProvider>) {
        let mut state = self.state.write().unwrap();
        if state.config.max_history_messages > 0 {
            memory.set_max_history_messages(state.config.max_history_messages);
        }
        state.memory = Some(memory);
    }

    pub fn set_config(&self, config: AgentConfig) {
        self.state.write().unwrap().config = config;
    }

    pub fn set_temperature(&self, temperature: f32) {
        self.state.write().unwrap().config.temperature = Some(temperature);
    }

    pub fn set_max_tokens(&self, max_tokens: u32) {
        self.state.write().unwrap().config.max_tokens = Some(max_tokens);
    }

    pub fn set_top_p(&self, top_p: f32) {
        self.state.write().unwrap().config.top_p = Some(top_p);
    }

    pub fn set_frequency_penalty(&self, penalty: f32) {
        self.state.write().unwrap().config.frequency_penalty = Some(penalty);
    }

    pub fn set_presence_penalty(&self, penalty: f32) {
        self.state.write().unwrap().config.presence_penalty = Some(penalty);
    }

    pub fn set_stop_sequences(&self, sequences: Vec<String>) {
        self.state.write().unwrap().config.stop_sequences = sequences;
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.state.write().unwrap().config.timeout = Some(timeout);
    }

    pub fn set_retry_attempts(&self, attempts: u32) {
        self.state.write().unwrap().config.retry_attempts = attempts;
    }

    pub fn set_retry_delay(&self, delay: Duration) {
        self.state.write().unwrap().config.retry_delay = Some(delay);
    }

    pub fn set_enable_tool_retry(&self, enable: bool) {
        self.state.write().unwrap().config.enable_tool_retry = enable;
    }

    /// Whether an execution is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the engine: cancels in-flight model and tool calls. The
    /// streaming worker emits no further events and closes its channel.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn max_iterations(&self) -> usize {
        self.state.read().unwrap().config.max_iterations.max(1)
    }

    fn tooling_snapshot(
        &self,
    ) -> (
        AgentConfig,
        Vec<Arc<dyn Tool>>,
        HashMap<String, Arc<dyn Tool>>,
    ) {
        let state = self.state.read().unwrap();
        (
            state.config.clone(),
            state.tools.clone(),
            state.tools_by_name.clone(),
        )
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}

/// Summarize an externally conducted tool exchange for the model.
fn prior_steps_context(steps: &[ToolCallData]) -> String {
    let mut context = String::from("Previous tool calls:\n");
    for step in steps {
        let input = serde_json::Value::Object(step.action.tool_input.clone());
        context.push_str(&format!(
            "Tool: {}, Input: {}, Result: {}\n",
            step.action.tool, input, step.observation
        ));
    }
    context
}

/// Compose the next iteration's messages from the previous turn.
///
/// Keeps every system message and the most recent user question, mirrors
/// the assistant's response (with its structured calls), and compresses all
/// tool observations into one summary user message to keep context small.
fn build_next_messages(previous: &[Message], result: &AgentResult) -> Vec<Message> {
    let mut messages: Vec<Message> = previous
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();

    if let Some(user) = previous.iter().rev().find(|m| m.role == Role::User) {
        messages.push(user.clone());
    }

    if !result.output.is_empty() {
        let mut assistant = Message::assistant(&result.output);
        assistant.tool_calls = result.tool_calls.iter().map(ToolCallRequest::as_call).collect();
        messages.push(assistant);
    }

    if !result.intermediate_steps.is_empty() {
        let mut summary = String::from("Based on previous tool execution results:\n");
        for step in &result.intermediate_steps {
            summary.push_str(&format!(
                "- Tool {} returned: {}\n",
                step.action.tool, step.observation
            ));
        }
        summary
            .push_str("\nPlease continue analysis or complete the task based on these results.");
        messages.push(Message::user(summary));
    }

    messages
}
