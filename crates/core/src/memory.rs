//! Memory provider trait — per-session conversation history.
//!
//! The engine depends only on this interface. Concrete providers (in-process,
//! file-backed, key-value stores, document stores) live in their own crates
//! and must all:
//! - Return history in insertion order, oldest first
//! - Be safe for concurrent reads and writes
//! - Bound history to the configured limit, trimming oldest first
//! - Rewrite history atomically during compression: either the new history
//!   is fully visible or the old one is untouched

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::message::Message;
use crate::provider::LlmProvider;

/// Conversation-history storage for a single session.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// The provider name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Append a message to the history.
    async fn add_message(&self, message: Message) -> Result<(), MemoryError>;

    /// The most recent `limit` messages, oldest first (0 = all retained).
    async fn get_messages(&self, limit: usize) -> Result<Vec<Message>, MemoryError>;

    /// The full retained history, oldest first.
    async fn get_chat_history(&self) -> Result<Vec<Message>, MemoryError>;

    /// Record one completed turn: a user message with `input` followed by
    /// an assistant message with `output`.
    async fn save_context(&self, input: &str, output: &str) -> Result<(), MemoryError>;

    /// Drop all history.
    async fn clear(&self) -> Result<(), MemoryError>;

    /// Summarize messages older than the most recent `max_messages`
    /// non-system ones into a single system summary message, using `llm`.
    /// A no-op when nothing is old enough to compress.
    async fn compress(
        &self,
        llm: Arc<dyn LlmProvider>,
        max_messages: usize,
    ) -> Result<(), MemoryError>;

    /// Cap retained history; 0 disables the cap. Takes effect immediately,
    /// trimming oldest messages if needed.
    fn set_max_history_messages(&self, limit: usize);
}
