pub mod result;
pub mod retrieve_chunk;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

pub use result::ToolResult;
pub use retrieve_chunk::RetrieveChunkTool;

/// Tool description handed to the provider: name, description, and a
/// JSON-schema object for the parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A callable tool. Execution takes the decoded argument object and
/// never touches persistent session state directly.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    fn execute(&self, args: &Value) -> ToolResult;
}

/// Name-keyed registry of the tools available to one agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Specs for every registered tool, for the provider call.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn execute(&self, name: &str, args: &Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args),
            None => ToolResult::error(format!("unknown tool: {name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the input back."
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"}
                },
                "required": ["text"]
            })
        }

        fn execute(&self, args: &Value) -> ToolResult {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("");
            ToolResult::text(text)
        }
    }

    #[test]
    fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        assert!(registry.contains("echo"));
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");

        let result = registry.execute("echo", &json!({"text": "hi"}));
        assert_eq!(result.for_llm, "hi");

        let missing = registry.execute("nope", &json!({}));
        assert!(missing.is_error);
    }

    #[test]
    fn model_tool_calls_route_through_the_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = crate::provider::ToolCall {
            name: "echo".to_string(),
            arguments: json!({"text": "routed"}),
        };
        let result = registry.execute(&call.name, &call.arguments);
        assert_eq!(result.for_llm, "routed");
    }
}
