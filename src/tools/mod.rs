use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod builtin;
pub mod executor;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> anyhow::Result<Value>;
}

/// JSON schema for a tool's parameter struct.
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}))
}

/// Deserializes tool arguments; a missing argument object counts as `{}`.
pub fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> anyhow::Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| anyhow::anyhow!("Invalid arguments for {}: {}", tool, e))
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn get_definitions(&self) -> Vec<Value> {
        self.list_tools()
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.parameters_schema()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct EchoParams {
        /// Text to echo back
        text: String,
        times: Option<u32>,
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo text"
        }

        fn parameters_schema(&self) -> Value {
            schema_of::<EchoParams>()
        }

        async fn execute(&self, params: Value) -> anyhow::Result<Value> {
            let params: EchoParams = parse_params(self.name(), params)?;
            Ok(json!({ "result": params.text }))
        }
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = schema_of::<EchoParams>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["text"].is_object());
        assert!(schema["properties"]["times"].is_object());
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("text")));
        assert!(!required.contains(&json!("times")));
    }

    #[test]
    fn test_parse_params_treats_null_as_empty() {
        #[derive(Deserialize)]
        struct Empty {
            limit: Option<usize>,
        }
        let parsed: Empty = parse_params("t", Value::Null).unwrap();
        assert!(parsed.limit.is_none());

        let err = parse_params::<EchoParams>("echo", json!({"times": 2})).unwrap_err();
        assert!(err.to_string().contains("Invalid arguments for echo"));
    }

    #[tokio::test]
    async fn test_registry_lookup_and_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());

        let defs = registry.get_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["name"], "echo");

        let out = registry
            .get("echo")
            .unwrap()
            .execute(json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out["result"], "hi");
    }
}
