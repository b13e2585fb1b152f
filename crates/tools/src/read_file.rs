//! File read tool — return the current content of a workspace file.

use crate::args;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;

/// Maximum characters returned before truncation.
const MAX_CHARS: usize = 100_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the current content of a file in the application workspace."
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
        let Some(content) = ctx.read_file(self.name(), &path).await? else {
            return Ok(ToolOutput::error(format!("File not found: {path}")));
        };

        if content.chars().count() > MAX_CHARS {
            let truncated: String = content.chars().take(MAX_CHARS).collect();
            return Ok(ToolOutput::ok(format!(
                "{truncated}\n\n[truncated: {path} has {} characters]",
                content.chars().count()
            )));
        }
        Ok(ToolOutput::ok(content))
    }
}
