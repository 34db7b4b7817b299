//! # Axon Core
//!
//! Domain types, traits, and error definitions for the Axon agent engine.
//! This crate has **zero framework dependencies** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here. Implementations
//! live in their respective crates (or outside the workspace entirely).
//! This enables:
//! - Swapping LLM providers and memory backends via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AgentResult, ToolActionStep, ToolCallData, ToolCallRequest};
pub use error::{EngineError, MemoryError, ProviderError, ToolError};
pub use memory::MemoryProvider;
pub use message::{ContentPart, Message, Role, ToolCall, ToolFunction};
pub use provider::{LlmProvider, StreamMessage};
pub use tool::{Tool, ToolDefinition, ToolMetadata};
