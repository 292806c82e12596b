//! Built-in tools shipped with the binary.

use async_trait::async_trait;
use serde_json::{Value, json};

use chatflow_agent::{AgentError, Result, ToolAdapter, ToolDefinition};

/// `current_time` and `word_count`.
pub struct BuiltinTools;

#[async_trait]
impl ToolAdapter for BuiltinTools {
    fn adapter_id(&self) -> &str {
        "builtin"
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "current_time".into(),
                description: "Current date and time in UTC, RFC 3339 formatted.".into(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "word_count".into(),
                description: "Count the whitespace-separated words in a text.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            },
        ]
    }

    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String> {
        match tool_name {
            "current_time" => Ok(chrono::Utc::now().to_rfc3339()),
            "word_count" => {
                let text = arguments
                    .get("text")
                    .or_else(|| arguments.get("input"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::ToolExecutionFailed {
                        tool_name: tool_name.to_owned(),
                        reason: "missing string argument `text`".into(),
                    })?;
                Ok(text.split_whitespace().count().to_string())
            }
            other => Err(AgentError::UnknownTool {
                tool_name: other.to_owned(),
            }),
        }
    }
}
