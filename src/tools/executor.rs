use crate::tools::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute(&self, name: &str, params: Value) -> anyhow::Result<Value> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", name))?;

        debug!("Tools: executing {}", name);
        let result = tool.execute(params).await;
        if let Err(e) = &result {
            warn!("Tools: {} failed: {:#}", name, e);
        }
        result
    }
}
