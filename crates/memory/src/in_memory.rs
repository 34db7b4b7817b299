//! In-process memory provider — useful for testing and ephemeral sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use axon_core::error::MemoryError;
use axon_core::memory::MemoryProvider;
use axon_core::message::Message;
use axon_core::provider::LlmProvider;

use crate::compress::{partition, rebuild, summary_request};

const DEFAULT_HISTORY_LIMIT: usize = 100;

/// A memory provider that keeps history in a Vec.
pub struct InMemoryProvider {
    messages: RwLock<Vec<Message>>,
    max_history: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create with a specific history cap (0 = unbounded).
    pub fn with_limit(max_history: usize) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            max_history: AtomicUsize::new(max_history),
        }
    }

    fn trim(messages: &mut Vec<Message>, limit: usize) {
        if limit > 0 && messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add_message(&self, message: Message) -> Result<(), MemoryError> {
        let limit = self.max_history.load(Ordering::SeqCst);
        let mut messages = self.messages.write().unwrap();
        messages.push(message);
        Self::trim(&mut messages, limit);
        Ok(())
    }

    async fn get_messages(&self, limit: usize) -> Result<Vec<Message>, MemoryError> {
        let messages = self.messages.read().unwrap();
        if limit == 0 || limit >= messages.len() {
            return Ok(messages.clone());
        }
        Ok(messages[messages.len() - limit..].to_vec())
    }

    async fn get_chat_history(&self) -> Result<Vec<Message>, MemoryError> {
        Ok(self.messages.read().unwrap().clone())
    }

    async fn save_context(&self, input: &str, output: &str) -> Result<(), MemoryError> {
        let limit = self.max_history.load(Ordering::SeqCst);
        let mut messages = self.messages.write().unwrap();
        messages.push(Message::user(input));
        messages.push(Message::assistant(output));
        Self::trim(&mut messages, limit);
        Ok(())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.messages.write().unwrap().clear();
        Ok(())
    }

    async fn compress(
        &self,
        llm: Arc<dyn LlmProvider>,
        max_messages: usize,
    ) -> Result<(), MemoryError> {
        let history = self.messages.read().unwrap().clone();
        if history.len() <= max_messages {
            return Ok(());
        }

        let parts = partition(&history, max_messages);
        if parts.old.is_empty() {
            return Ok(());
        }

        let summary = llm
            .chat(summary_request(&parts.old))
            .await
            .map_err(|e| MemoryError::Compression(e.to_string()))?;

        let rebuilt = rebuild(parts.system, &summary.text(), parts.recent);
        debug!(
            original_count = history.len(),
            compressed_count = rebuilt.len(),
            "history compressed"
        );
        *self.messages.write().unwrap() = rebuilt;
        Ok(())
    }

    fn set_max_history_messages(&self, limit: usize) {
        self.max_history.store(limit, Ordering::SeqCst);
        let mut messages = self.messages.write().unwrap();
        Self::trim(&mut messages, limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_core::error::ProviderError;
    use axon_core::message::Role;
    use axon_core::tool::ToolDefinition;

    struct SummarizerStub;

    #[async_trait]
    impl LlmProvider for SummarizerStub {
        async fn chat(&self, messages: Vec<Message>) -> Result<Message, ProviderError> {
            assert_eq!(messages.len(), 2);
            assert!(messages[1].content.starts_with("Please provide a concise summary"));
            Ok(Message::assistant("they discussed numbers"))
        }

        async fn chat_with_tools(
            &self,
            messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
        ) -> Result<Message, ProviderError> {
            self.chat(messages).await
        }
    }

    #[tokio::test]
    async fn history_keeps_insertion_order() {
        let memory = InMemoryProvider::new();
        memory.add_message(Message::user("first")).await.unwrap();
        memory.add_message(Message::assistant("second")).await.unwrap();

        let history = memory.get_chat_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn save_context_appends_user_then_assistant() {
        let memory = InMemoryProvider::new();
        memory.save_context("Hello", "Hi.").await.unwrap();

        let history = memory.get_chat_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hi.");
    }

    #[tokio::test]
    async fn limit_trims_oldest() {
        let memory = InMemoryProvider::with_limit(3);
        for i in 0..5 {
            memory.add_message(Message::user(format!("m{i}"))).await.unwrap();
        }

        let history = memory.get_chat_history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "m2");
    }

    #[tokio::test]
    async fn lowering_limit_trims_immediately() {
        let memory = InMemoryProvider::with_limit(0);
        for i in 0..6 {
            memory.add_message(Message::user(format!("m{i}"))).await.unwrap();
        }
        memory.set_max_history_messages(2);

        let history = memory.get_chat_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m4");
    }

    #[tokio::test]
    async fn get_messages_returns_most_recent() {
        let memory = InMemoryProvider::new();
        for i in 0..4 {
            memory.add_message(Message::user(format!("m{i}"))).await.unwrap();
        }

        let recent = memory.get_messages(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m2");

        let all = memory.get_messages(0).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn compress_replaces_old_with_summary() {
        let memory = InMemoryProvider::with_limit(0);
        for i in 0..10 {
            memory.add_message(Message::user(format!("m{i}"))).await.unwrap();
        }

        memory.compress(Arc::new(SummarizerStub), 4).await.unwrap();

        let history = memory.get_chat_history().await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(
            history[0].content,
            "Previous conversation summary: they discussed numbers"
        );
        // The recent tail survives byte-for-byte
        for (i, message) in history[1..].iter().enumerate() {
            assert_eq!(message.content, format!("m{}", i + 6));
        }
    }

    #[tokio::test]
    async fn compress_is_noop_below_threshold() {
        let memory = InMemoryProvider::new();
        for i in 0..3 {
            memory.add_message(Message::user(format!("m{i}"))).await.unwrap();
        }

        memory.compress(Arc::new(SummarizerStub), 4).await.unwrap();
        assert_eq!(memory.get_chat_history().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_compression_leaves_history_untouched() {
        struct FailingLlm;

        #[async_trait]
        impl LlmProvider for FailingLlm {
            async fn chat(&self, _messages: Vec<Message>) -> Result<Message, ProviderError> {
                Err(ProviderError::NoResponse)
            }
            async fn chat_with_tools(
                &self,
                messages: Vec<Message>,
                _tools: Vec<ToolDefinition>,
            ) -> Result<Message, ProviderError> {
                self.chat(messages).await
            }
        }

        let memory = InMemoryProvider::new();
        for i in 0..10 {
            memory.add_message(Message::user(format!("m{i}"))).await.unwrap();
        }

        let err = memory.compress(Arc::new(FailingLlm), 4).await.unwrap_err();
        assert!(matches!(err, MemoryError::Compression(_)));
        assert_eq!(memory.get_chat_history().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let memory = InMemoryProvider::new();
        memory.add_message(Message::user("m")).await.unwrap();
        memory.clear().await.unwrap();
        assert!(memory.get_chat_history().await.unwrap().is_empty());
    }
}
