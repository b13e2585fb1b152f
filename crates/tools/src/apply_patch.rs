//! Structured patch tool — ordered search/replace edits on one file.
//!
//! Each edit's search text must occur exactly once in the content as left
//! by the previous edits. Any ambiguous or missing match rejects the whole
//! patch and nothing is written.

use crate::args;
use crate::write_file::normalize_escapes;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Edit {
    search: String,
    replace: String,
}

pub struct ApplyPatchTool;

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply search/replace edits to an existing file. Each search string must match exactly once; \
         include enough surrounding lines to make it unique. If any edit fails, no change is made."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                },
                "edits": {
                    "type": "array",
                    "description": "Edits applied in order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "search": { "type": "string", "description": "Exact text to find" },
                            "replace": { "type": "string", "description": "Replacement text" }
                        },
                        "required": ["search", "replace"]
                    }
                }
            },
            "required": ["path", "edits"]
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
        let edits: Vec<Edit> = serde_json::from_value(arguments["edits"].clone())
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid 'edits' argument: {e}")))?;
        if edits.is_empty() {
            return Err(ToolError::InvalidArguments("'edits' must not be empty".into()));
        }

        let Some(original) = ctx.read_file(self.name(), &path).await? else {
            return Ok(ToolOutput::error(format!("File not found: {path}")));
        };

        let patched = match apply_edits(&original, &edits) {
            Ok(patched) => patched,
            Err(reason) => return Ok(ToolOutput::error(format!("Patch rejected for {path}: {reason}"))),
        };

        let outcome = ctx.write_file(self.name(), &path, &patched).await?;
        Ok(ToolOutput::ok_with_data(
            format!("Applied {} edit(s) to {path}", edits.len()),
            serde_json::json!({
                "path": path,
                "changed": outcome.changed,
                "fingerprint": outcome.fingerprint,
            }),
        ))
    }
}

fn apply_edits(original: &str, edits: &[Edit]) -> Result<String, String> {
    let mut content = original.to_string();
    for (i, edit) in edits.iter().enumerate() {
        let search = normalize_escapes(&edit.search);
        let replace = normalize_escapes(&edit.replace);
        if search.is_empty() {
            return Err(format!("edit {} has an empty search string", i + 1));
        }
        match content.matches(&*search).count() {
            1 => content = content.replacen(&*search, &replace, 1),
            0 => return Err(format!("edit {}: search text not found", i + 1)),
            n => {
                return Err(format!(
                    "edit {}: search text matches {n} times; add surrounding context",
                    i + 1
                ));
            }
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    const APP: &str = "export default function App() {\n  return <h1>Hello</h1>;\n}\n";

    #[tokio::test]
    async fn applies_edits_in_order() {
        let fx = Fixture::new();
        fx.seed("src/App.tsx", APP).await;

        let out = ApplyPatchTool
            .execute(
                &fx.ctx,
                serde_json::json!({
                    "path": "src/App.tsx",
                    "edits": [
                        {"search": "<h1>Hello</h1>", "replace": "<h1>Todos</h1>"},
                        {"search": "Todos", "replace": "My Todos"}
                    ]
                }),
            )
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert_eq!(
            fx.read("src/App.tsx").await.unwrap(),
            "export default function App() {\n  return <h1>My Todos</h1>;\n}\n"
        );
    }

    #[tokio::test]
    async fn ambiguous_match_rejects_whole_patch() {
        let fx = Fixture::new();
        fx.seed("src/App.tsx", APP).await;

        let out = ApplyPatchTool
            .execute(
                &fx.ctx,
                serde_json::json!({
                    "path": "src/App.tsx",
                    "edits": [
                        {"search": "Hello", "replace": "Hi"},
                        {"search": "h1", "replace": "h2"}
                    ]
                }),
            )
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("matches 2 times"));
        assert_eq!(fx.read("src/App.tsx").await.unwrap(), APP);
    }

    #[tokio::test]
    async fn missing_search_text_is_reported() {
        let fx = Fixture::new();
        fx.seed("src/App.tsx", APP).await;

        let out = ApplyPatchTool
            .execute(
                &fx.ctx,
                serde_json::json!({
                    "path": "src/App.tsx",
                    "edits": [{"search": "Goodbye", "replace": "x"}]
                }),
            )
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("not found"));
    }

    #[tokio::test]
    async fn malformed_edits_are_invalid_arguments() {
        let fx = Fixture::new();
        let err = ApplyPatchTool
            .execute(&fx.ctx, serde_json::json!({"path": "a.ts", "edits": "oops"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
