//! Web search tool — delegates to the configured search service.

use crate::args;
use crate::services::{self, ExternalService};
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

pub struct WebSearchTool {
    service: Option<Arc<dyn ExternalService>>,
}

impl WebSearchTool {
    pub fn new(service: Option<Arc<dyn ExternalService>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for documentation or reference material. Returns titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let query = args::required_str(&arguments, "query")?;
        let num_results = arguments["num_results"].as_u64().unwrap_or(5).clamp(1, 10);

        let payload = services::call(
            &self.service,
            self.name(),
            serde_json::json!({ "query": query, "num_results": num_results }),
        )
        .await?;
        Ok(payload_output(payload))
    }
}

/// Render a service payload for the model, keeping the structured copy.
pub(crate) fn payload_output(payload: serde_json::Value) -> ToolOutput {
    let text = match &payload {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    ToolOutput::ok_with_data(text, payload)
}
