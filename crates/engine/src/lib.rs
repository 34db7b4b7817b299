//! The Axon agent engine — the heart of the workspace.
//!
//! The engine drives an LLM through a bounded reasoning loop:
//!
//! 1. **Prepare** the message list (system prompt + memory history + prior
//!    tool context + user input)
//! 2. **Call the model**, with the registered tool catalog
//! 3. **If tool calls**: order the batch by priority and dependencies,
//!    execute each tool (consulting the result cache), fold observations
//!    into the next turn's messages, loop back to step 2
//! 4. **If text only**: that is the final answer
//!
//! The loop runs at most `max_iterations` turns; on the last allowed turn
//! tool calls are recorded but not executed. Both a blocking
//! ([`AgentEngine::execute`]) and a streaming
//! ([`AgentEngine::execute_stream`]) entry point are provided, guarded by a
//! single-flight gate — one execution per engine at a time.

mod cache;
mod engine;
mod executor;
mod scheduler;
mod stream_event;

pub use engine::{AgentEngine, DEFAULT_CHANNEL_BUFFER, ITERATION_DELAY};
pub use stream_event::StreamEvent;
