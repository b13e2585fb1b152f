//! File rename tool — move a file to a new workspace path.

use crate::args;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;

pub struct RenameFileTool;

#[async_trait]
impl Tool for RenameFileTool {
    fn name(&self) -> &str {
        "rename_file"
    }

    fn description(&self) -> &str {
        "Rename or move a file inside the application workspace. Fails if the destination exists unless overwrite is set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "from": {
                    "type": "string",
                    "description": "Current workspace-relative path"
                },
                "to": {
                    "type": "string",
                    "description": "New workspace-relative path"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Replace an existing destination file (default false)",
                    "default": false
                }
            },
            "required": ["from", "to"]
        })
    }

    fn touched_paths(&self, arguments: &serde_json::Value) -> Vec<String> {
        ["from", "to"]
            .into_iter()
            .filter_map(|key| args::touched(arguments, key))
            .collect()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let from = args::required_path(&arguments, "from")?;
        let to = args::required_path(&arguments, "to")?;
        let overwrite = arguments["overwrite"].as_bool().unwrap_or(false);

        if from == to {
            return Ok(ToolOutput::error(format!("{from} and {to} are the same path")));
        }
        let Some(content) = ctx.read_file(self.name(), &from).await? else {
            return Ok(ToolOutput::error(format!("File not found: {from}")));
        };
        if !overwrite && ctx.read_file(self.name(), &to).await?.is_some() {
            return Ok(ToolOutput::error(format!(
                "{to} already exists; set overwrite to replace it"
            )));
        }

        ctx.write_file(self.name(), &to, &content).await?;
        ctx.delete_file(self.name(), &from).await?;
        Ok(ToolOutput::ok(format!("Renamed {from} to {to}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn moves_content() {
        let fx = Fixture::new();
        fx.seed("src/Old.tsx", "export const Old = 1;\n").await;

        let out = RenameFileTool
            .execute(&fx.ctx, serde_json::json!({"from": "src/Old.tsx", "to": "src/New.tsx"}))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert!(fx.read("src/Old.tsx").await.is_none());
        assert_eq!(fx.read("src/New.tsx").await.as_deref(), Some("export const Old = 1;\n"));
    }

    #[tokio::test]
    async fn refuses_to_clobber_without_overwrite() {
        let fx = Fixture::new();
        fx.seed("a.ts", "a").await;
        fx.seed("b.ts", "b").await;

        let out = RenameFileTool
            .execute(&fx.ctx, serde_json::json!({"from": "a.ts", "to": "b.ts"}))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(fx.read("b.ts").await.as_deref(), Some("b"));

        let out = RenameFileTool
            .execute(&fx.ctx, serde_json::json!({"from": "a.ts", "to": "b.ts", "overwrite": true}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(fx.read("b.ts").await.as_deref(), Some("a"));
    }

    #[test]
    fn touches_both_paths() {
        let paths = RenameFileTool.touched_paths(&serde_json::json!({"from": "./a.ts", "to": "b.ts"}));
        assert_eq!(paths, vec!["a.ts", "b.ts"]);
    }
}
