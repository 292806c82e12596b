//! Tool adapters and the registry the tool node invokes.
//!
//! Tools live outside the core.  Anything that can run a named tool
//! implements [`ToolAdapter`]; the [`ToolRegistry`] collects adapters and
//! resolves a tool name to the adapter that owns it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::types::ToolDefinition;

// ---------------------------------------------------------------------------
// Tool adapter trait
// ---------------------------------------------------------------------------

/// Trait for components that can execute tool calls on behalf of the agent.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The unique identifier for this adapter.
    fn adapter_id(&self) -> &str;

    /// Returns the tool definitions this adapter exposes to the model.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a named tool with the given arguments.
    ///
    /// Returns the result as a string suitable for feeding back to the model.
    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of tools available to one executor.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    adapters: Vec<Arc<dyn ToolAdapter>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.adapter_id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter.
    pub fn with_adapter(mut self, adapter: Arc<dyn ToolAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Add an adapter in place.
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        tracing::debug!(
            adapter = adapter.adapter_id(),
            tools = adapter.tool_definitions().len(),
            "registered tool adapter"
        );
        self.adapters.push(adapter);
    }

    /// Collect all tool definitions from registered adapters.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.adapters
            .iter()
            .flat_map(|a| a.tool_definitions())
            .collect()
    }

    /// Number of tools across all adapters.
    pub fn tool_count(&self) -> usize {
        self.adapters
            .iter()
            .map(|a| a.tool_definitions().len())
            .sum()
    }

    /// Find the adapter that owns a given tool name.
    fn find_adapter_for_tool(&self, tool_name: &str) -> Option<&Arc<dyn ToolAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.tool_definitions().iter().any(|td| td.name == tool_name))
    }

    /// Run `tool_name` with `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownTool`] when no adapter exposes the tool,
    /// otherwise whatever the adapter reports.
    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> Result<String> {
        let adapter = self
            .find_adapter_for_tool(tool_name)
            .ok_or_else(|| AgentError::UnknownTool {
                tool_name: tool_name.to_owned(),
            })?;

        tracing::debug!(tool = tool_name, adapter = adapter.adapter_id(), "invoking tool");
        adapter.execute(tool_name, arguments).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct MockAdapter {
        id: String,
        tools: Vec<ToolDefinition>,
    }

    #[async_trait]
    impl ToolAdapter for MockAdapter {
        fn adapter_id(&self) -> &str {
            &self.id
        }

        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            self.tools.clone()
        }

        async fn execute(&self, tool_name: &str, _arguments: Value) -> Result<String> {
            Ok(format!("mock result for {tool_name}"))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_adapter(Arc::new(MockAdapter {
            id: "test".into(),
            tools: vec![
                ToolDefinition {
                    name: "tool_a".into(),
                    description: "Tool A".into(),
                    input_schema: serde_json::json!({"type": "object"}),
                },
                ToolDefinition {
                    name: "tool_b".into(),
                    description: "Tool B".into(),
                    input_schema: serde_json::json!({"type": "object"}),
                },
            ],
        }))
    }

    #[test]
    fn registry_collects_tools() {
        let registry = registry();
        let tools = registry.definitions();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "tool_a");
        assert_eq!(tools[1].name, "tool_b");
        assert_eq!(registry.tool_count(), 2);
    }

    #[tokio::test]
    async fn registry_dispatches_to_owning_adapter() {
        let out = registry()
            .invoke("tool_b", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out, "mock result for tool_b");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let err = registry()
            .invoke("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool { tool_name } if tool_name == "nonexistent"));
    }
}
