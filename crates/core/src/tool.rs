//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the model act on the workspace: read and write files,
//! list directories, run shell commands. Each tool declares a risk tier and
//! whether it is read-only and cacheable; the scheduler and permission gate
//! make their decisions from those declarations alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::error::ToolError;
use crate::provider::ToolSchema;

/// Risk tier controlling whether a call needs explicit approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Filesystem,
    Git,
    Search,
    Web,
    Shell,
    Testing,
}

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool-use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The core Tool trait.
///
/// Each tool is registered in the [`ToolRegistry`] and made available to the
/// conversation loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    fn risk(&self) -> RiskLevel;

    fn category(&self) -> ToolCategory;

    /// Whether the tool can mutate external state. Read-only tools may run
    /// concurrently with each other.
    fn read_only(&self) -> bool {
        false
    }

    /// Whether results may be served from the tool cache.
    fn cacheable(&self) -> bool {
        self.read_only()
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a ToolSchema for sending to the LLM.
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A name-keyed registry of available tools, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name,
    /// keeping its original position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&pos) => self.tools[pos] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&pos| Arc::clone(&self.tools[pos]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tool schemas, in registration order (for sending to the LLM).
    pub fn list_definitions(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.to_schema()).collect()
    }

    /// Execute a tool call directly, without cache or permission checks.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone()).await
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        fn risk(&self) -> RiskLevel { RiskLevel::Low }
        fn category(&self) -> ToolCategory { ToolCategory::Shell }
        fn read_only(&self) -> bool { true }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str { self.0 }
        fn description(&self) -> &str { "named" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        fn risk(&self) -> RiskLevel { RiskLevel::High }
        fn category(&self) -> ToolCategory { ToolCategory::Shell }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<String, ToolError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_definitions_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("zeta")));
        registry.register(Arc::new(NamedTool("alpha")));
        registry.register(Arc::new(EchoTool));
        let names: Vec<_> = registry.list_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "echo"]);
    }

    #[test]
    fn cacheable_defaults_to_read_only() {
        assert!(EchoTool.cacheable());
        assert!(!NamedTool("x").cacheable());
        assert!(RiskLevel::High > RiskLevel::Low);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let output = registry.execute(&call).await.unwrap();
        assert_eq!(output, "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
