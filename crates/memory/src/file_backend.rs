//! File-based memory provider — persistent JSONL storage.
//!
//! Each line is one JSON-encoded message. History is loaded into memory on
//! creation and flushed on every mutation. Flushes write a temporary file
//! and rename it over the original, so a crash mid-write (or mid-compression)
//! never leaves a half-written history behind.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use axon_core::error::MemoryError;
use axon_core::memory::MemoryProvider;
use axon_core::message::Message;
use axon_core::provider::LlmProvider;

use crate::compress::{partition, rebuild, summary_request};

/// A file-backed provider using JSONL (one JSON object per line).
pub struct FileProvider {
    path: PathBuf,
    messages: RwLock<Vec<Message>>,
    max_history: AtomicUsize,
}

impl FileProvider {
    /// Create a provider at the given path.
    ///
    /// If the file exists, messages are loaded from it; corrupted lines are
    /// skipped. If it does not exist, history starts empty and the file is
    /// created on first write.
    pub fn new(path: PathBuf) -> Self {
        let messages = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = messages.len(), "file memory provider loaded");
        Self {
            path,
            messages: RwLock::new(messages),
            max_history: AtomicUsize::new(0),
        }
    }

    /// Create with a history cap (0 = unbounded).
    pub fn with_limit(path: PathBuf, max_history: usize) -> Self {
        let provider = Self::new(path);
        provider.max_history.store(max_history, Ordering::SeqCst);
        provider
    }

    fn load_from_disk(path: &PathBuf) -> Vec<Message> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Vec::new(), // File doesn't exist yet — start empty
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Message>(line) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, "skipping corrupted history entry");
                    None
                }
            })
            .collect()
    }

    /// Write the given history to disk via temp-file-then-rename.
    fn flush_locked(&self, messages: &[Message]) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("failed to create history directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for message in messages {
            let line = serde_json::to_string(message)
                .map_err(|e| MemoryError::Storage(format!("failed to serialize message: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, &content)
            .map_err(|e| MemoryError::Storage(format!("failed to write history file: {e}")))?;
        std::fs::rename(&staging, &self.path)
            .map_err(|e| MemoryError::Storage(format!("failed to swap history file: {e}")))?;

        Ok(())
    }

    fn trim(messages: &mut Vec<Message>, limit: usize) {
        if limit > 0 && messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
    }
}

#[async_trait]
impl MemoryProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn add_message(&self, message: Message) -> Result<(), MemoryError> {
        let limit = self.max_history.load(Ordering::SeqCst);
        let mut messages = self.messages.write().unwrap();
        messages.push(message);
        Self::trim(&mut messages, limit);
        self.flush_locked(&messages)
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
        self.flush_locked(&messages)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().unwrap();
        messages.clear();
        self.flush_locked(&messages)
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
        let mut messages = self.messages.write().unwrap();
        // Disk first: if the flush fails, the old history stays visible
        self.flush_locked(&rebuilt)?;
        *messages = rebuilt;
        Ok(())
    }

    fn set_max_history_messages(&self, limit: usize) {
        self.max_history.store(limit, Ordering::SeqCst);
        let mut messages = self.messages.write().unwrap();
        if limit > 0 && messages.len() > limit {
            Self::trim(&mut messages, limit);
            if let Err(e) = self.flush_locked(&messages) {
                warn!(error = %e, "failed to flush trimmed history");
            }
        }
    }
}
