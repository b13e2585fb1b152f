//! Log reader tool — build output, runtime errors and analytics for the
//! running preview.

use crate::services::{self, ExternalService};
use crate::web_search::payload_output;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

const SOURCES: &[&str] = &["build", "runtime", "analytics"];

pub struct ReadLogsTool {
    service: Option<Arc<dyn ExternalService>>,
}

impl ReadLogsTool {
    pub fn new(service: Option<Arc<dyn ExternalService>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for ReadLogsTool {
    fn name(&self) -> &str {
        "read_logs"
    }

    fn description(&self) -> &str {
        "Read recent build logs, runtime console errors, or usage analytics of the application preview."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "enum": SOURCES,
                    "default": "runtime"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum entries to return (default 50)",
                    "default": 50
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let source = arguments["source"].as_str().unwrap_or("runtime");
        if !SOURCES.contains(&source) {
            return Err(ToolError::InvalidArguments(format!("Unknown log source '{source}'")));
        }
        let limit = arguments["limit"].as_u64().unwrap_or(50).clamp(1, 500);

        let payload = services::call(
            &self.service,
            self.name(),
            serde_json::json!({
                "workspace_id": ctx.workspace_id.to_string(),
                "source": source,
                "limit": limit,
            }),
        )
        .await?;
        Ok(payload_output(payload))
    }
}
