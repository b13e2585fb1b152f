//! File delete tool.

use crate::args;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the application workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                }
            },
            "required": ["path"]
        })
    }

    fn touched_paths(&self, arguments: &serde_json::Value) -> Vec<String> {
        args::touched(arguments, "path").into_iter().collect()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let path = args::required_path(&arguments, "path")?;
        if ctx.read_file(self.name(), &path).await?.is_none() {
            return Ok(ToolOutput::error(format!("File not found: {path}")));
        }
        ctx.delete_file(self.name(), &path).await?;
        Ok(ToolOutput::ok(format!("Deleted {path}")))
    }
}
