//! LLM provider trait — the abstraction over model backends.
//!
//! A provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of chunks. The engine
//! calls this trait without knowing which backend is behind it.
//!
//! Provider implementations are responsible for:
//! - Parsing string-encoded tool arguments once at the boundary
//!   ([`crate::message::ToolFunction::parse_arguments`])
//! - Handling rate limits (HTTP 429) with bounded retries, honoring any
//!   server-advised delay ([`ProviderError::RateLimited`])
//! - Accepting multimodal content parts (text, image URL, image binary)
//! - Never serializing a null content field (empty string instead)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, ToolCall};
use crate::tool::ToolDefinition;

/// A single item in a provider's response stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Partial assistant text
    Chunk { content: String },

    /// The aggregated tool-call batch for this response. Providers must
    /// extract this from the final aggregated response, never by parsing
    /// chunk text.
    ToolCalls { tool_calls: Vec<ToolCall> },

    /// Terminal failure; no further items follow
    Error { message: String },

    /// Normal end of stream
    End,
}

/// The core LLM provider trait.
///
/// Only the blocking pair is required; the streaming variants default to
/// calling the blocking method and emitting its response as a single-shot
/// stream, so simple providers get streaming support for free.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Plain chat without tools.
    async fn chat(&self, messages: Vec<Message>) -> Result<Message, ProviderError>;

    /// Chat with a tool catalog; the response may carry `tool_calls`.
    async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<Message, ProviderError>;

    /// Streaming chat without tools.
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
    ) -> Result<mpsc::Receiver<StreamMessage>, ProviderError> {
        let message = self.chat(messages).await?;
        let (tx, rx) = mpsc::channel(4);
        let content = message.text();
        if !content.is_empty() {
            let _ = tx.send(StreamMessage::Chunk { content }).await;
        }
        let _ = tx.send(StreamMessage::End).await;
        Ok(rx)
    }

    /// Streaming chat with tools.
    async fn chat_with_tools_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<mpsc::Receiver<StreamMessage>, ProviderError> {
        let message = self.chat_with_tools(messages, tools).await?;
        let (tx, rx) = mpsc::channel(4);
        let content = message.text();
        if !content.is_empty() {
            let _ = tx.send(StreamMessage::Chunk { content }).await;
        }
        if !message.tool_calls.is_empty() {
            let _ = tx
                .send(StreamMessage::ToolCalls {
                    tool_calls: message.tool_calls,
                })
                .await;
        }
        let _ = tx.send(StreamMessage::End).await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolFunction;

    struct FixedProvider {
        reply: Message,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn chat(&self, _messages: Vec<Message>) -> Result<Message, ProviderError> {
            Ok(self.reply.clone())
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
    async fn default_stream_wraps_blocking_reply() {
        let provider = FixedProvider {
            reply: Message::assistant("Hi."),
        };
        let mut rx = provider.chat_stream(vec![Message::user("Hello")]).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamMessage::Chunk { ref content } if content == "Hi."));
        assert!(matches!(rx.recv().await.unwrap(), StreamMessage::End));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_tools_stream_emits_aggregated_calls() {
        let mut reply = Message::assistant("");
        reply.tool_calls = vec![crate::message::ToolCall::new(
            "call_1",
            "add",
            ToolFunction::parse_arguments(r#"{"a": 2, "b": 3}"#),
        )];
        let provider = FixedProvider { reply };

        let mut rx = provider
            .chat_with_tools_stream(vec![Message::user("add")], vec![])
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            StreamMessage::ToolCalls { tool_calls } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].function.name, "add");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), StreamMessage::End));
    }

    #[test]
    fn stream_message_serialization() {
        let msg = StreamMessage::Chunk {
            content: "hello".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
    }
}
