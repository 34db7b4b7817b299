//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. The
//! engine never inspects a tool's implementation; it only calls this
//! interface and forwards the declared schema to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// The core Tool trait.
///
/// Each tool implements this trait and is registered on the engine, which
/// makes it available to the model and dispatches calls back to it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Map<String, Value>,
    ) -> std::result::Result<Value, ToolError>;

    /// Scheduling and provenance metadata. Tools without ordering
    /// requirements can rely on the default.
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// Scheduling and provenance metadata attached to a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Where the tool came from (node name, empty for local tools)
    #[serde(default)]
    pub source_node: String,

    /// Whether the tool was registered as part of a toolkit
    #[serde(default)]
    pub is_from_toolkit: bool,

    /// Free-form tool category
    #[serde(default)]
    pub tool_type: String,

    /// Higher priority runs earlier within a batch
    #[serde(default)]
    pub priority: i32,

    /// Names of tools that must execute before this one in the same batch
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Map<String, Value>,
        ) -> Result<Value, ToolError> {
            Ok(arguments.get("text").cloned().unwrap_or(Value::Null))
        }
    }

    #[tokio::test]
    async fn tool_executes() {
        let tool = EchoTool;
        let mut args = serde_json::Map::new();
        args.insert("text".into(), Value::String("hello".into()));
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result, Value::String("hello".into()));
    }

    #[test]
    fn tool_definition_carries_schema() {
        let def = EchoTool.definition();
        assert_eq!(def.name, "echo");
        assert!(def.parameters["properties"]["text"].is_object());
    }

    #[test]
    fn default_metadata_is_neutral() {
        let meta = EchoTool.metadata();
        assert_eq!(meta.priority, 0);
        assert!(meta.dependencies.is_empty());
        assert!(!meta.is_from_toolkit);
    }
}
