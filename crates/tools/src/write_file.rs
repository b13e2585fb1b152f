//! File write tool — create or overwrite a workspace file.
//!
//! Models occasionally double-escape file bodies, sending a single line
//! full of literal `\n` sequences. Such content is unescaped before it is
//! persisted.

use crate::args;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use std::borrow::Cow;
use tracing::debug;

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the application workspace. Always send the complete file content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path, e.g. src/App.tsx"
                },
                "content": {
                    "type": "string",
                    "description": "The full file content"
                }
            },
            "required": ["path", "content"]
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
        let raw = args::required_str(&arguments, "content")?;

        let content = normalize_escapes(raw);
        if let Cow::Owned(_) = content {
            debug!(path = %path, "Unescaped literal newlines before writing");
        }

        let outcome = ctx.write_file(self.name(), &path, &content).await?;
        let output = if outcome.changed {
            format!("Wrote {} bytes to {path}", content.len())
        } else {
            format!("{path} is unchanged")
        };
        Ok(ToolOutput::ok_with_data(
            output,
            serde_json::json!({
                "path": path,
                "changed": outcome.changed,
                "fingerprint": outcome.fingerprint,
            }),
        ))
    }
}

/// Unescape content that arrived with literal `\n` instead of line breaks.
///
/// Only content with no real line break and at least two literal `\n`
/// sequences is touched; everything else is returned as is.
pub fn normalize_escapes(content: &str) -> Cow<'_, str> {
    if content.contains('\n') || content.matches("\\n").count() < 2 {
        return Cow::Borrowed(content);
    }
    Cow::Owned(
        content
            .replace("\\r\\n", "\n")
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\\"", "\""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use appforge_core::StabilityTier;
    use appforge_core::error::StoreError;
    use appforge_core::message::WorkspaceId;
    use appforge_core::store::{FileStore, InMemoryFileStore, StoredFile};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn schema_requires_path_and_content() {
        let schema = WriteFileTool.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("path")));
        assert!(required.contains(&serde_json::json!("content")));
    }

    #[test]
    fn escaped_newlines_are_normalized() {
        let fixed = normalize_escapes(r#"export function App() {\n  return <p className=\"x\">hi</p>;\n}"#);
        assert_eq!(
            fixed,
            "export function App() {\n  return <p className=\"x\">hi</p>;\n}"
        );
    }

    #[test]
    fn real_content_is_left_alone() {
        let source = "const re = /\\n/;\nconsole.log('a\\nb');\n";
        assert!(matches!(normalize_escapes(source), Cow::Borrowed(_)));
        assert!(matches!(normalize_escapes("one \\n only"), Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn writes_through_store_and_tracker() {
        let fx = Fixture::new();
        let out = WriteFileTool
            .execute(
                &fx.ctx,
                serde_json::json!({"path": "./src/App.tsx", "content": "export default 1;\n"}),
            )
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.data.as_ref().unwrap()["changed"], true);
        assert_eq!(fx.read("src/App.tsx").await.as_deref(), Some("export default 1;\n"));
        assert!(fx.tracker.take_invalidations(&fx.ctx.workspace_id).contains(&StabilityTier::Volatile));
    }

    #[tokio::test]
    async fn identical_rewrite_reports_unchanged() {
        let fx = Fixture::new();
        let args = serde_json::json!({"path": "index.html", "content": "<div id=\"root\"></div>\n"});
        WriteFileTool.execute(&fx.ctx, args.clone()).await.unwrap();
        fx.tracker.take_invalidations(&fx.ctx.workspace_id);

        let out = WriteFileTool.execute(&fx.ctx, args).await.unwrap();
        assert_eq!(out.output, "index.html is unchanged");
        assert!(fx.tracker.take_invalidations(&fx.ctx.workspace_id).is_empty());
    }

    #[tokio::test]
    async fn identical_rewrite_keeps_file_in_stable_context() {
        use appforge_context::{ContextAssembler, TemplateLibrary};
        use appforge_core::message::ConversationId;

        let fx = Fixture::new();
        let path = "src/components/ui/button.tsx";
        let body = "export const Button = () => null;\n";
        let seeded_at = chrono::Utc::now() - chrono::TimeDelta::hours(1);
        fx.store.write_at(&fx.ctx.workspace_id, path, body, seeded_at).await.unwrap();

        let assembler = ContextAssembler::new(
            Arc::new(TemplateLibrary::react_starter()),
            fx.store.clone(),
            fx.tracker.clone(),
        );
        let conv = ConversationId::from("conv");
        assembler.open(&conv, &fx.ctx.workspace_id, "create a todo app", None).await;
        let first = assembler.assemble(&conv).await.unwrap();

        let out = WriteFileTool
            .execute(&fx.ctx, serde_json::json!({"path": path, "content": body}))
            .await
            .unwrap();
        assert_eq!(out.data.as_ref().unwrap()["changed"], false);
        let listed = fx.store.list(&fx.ctx.workspace_id, path).await.unwrap();
        assert_eq!(listed[0].modified_at, seeded_at);

        let second = assembler.assemble(&conv).await.unwrap();
        assert!(!second.report.rebuilt_tiers.contains(&StabilityTier::Stable));
        assert_eq!(first.blocks[0], second.blocks[0]);
        assert!(second.report.items[&StabilityTier::Stable].contains(&path.to_string()));
    }

    /// Holds the first write of "slow" after persisting it.
    struct StallingStore {
        inner: InMemoryFileStore,
    }

    #[async_trait]
    impl FileStore for StallingStore {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn read(&self, ws: &WorkspaceId, path: &str) -> Result<Option<String>, StoreError> {
            self.inner.read(ws, path).await
        }

        async fn write(&self, ws: &WorkspaceId, path: &str, content: &str) -> Result<(), StoreError> {
            self.inner.write(ws, path, content).await?;
            if content == "slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(())
        }

        async fn delete(&self, ws: &WorkspaceId, path: &str) -> Result<(), StoreError> {
            self.inner.delete(ws, path).await
        }

        async fn list(&self, ws: &WorkspaceId, prefix: &str) -> Result<Vec<StoredFile>, StoreError> {
            self.inner.list(ws, prefix).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_writers_leave_fingerprint_matching_store() {
        use appforge_context::fingerprint;

        let fx = Fixture::new();
        let store = Arc::new(StallingStore {
            inner: InMemoryFileStore::new(),
        });
        let slow = ToolContext::new(fx.ctx.workspace_id.clone(), store.clone(), fx.tracker.clone());
        let fast = ToolContext::new(fx.ctx.workspace_id.clone(), store.clone(), fx.tracker.clone());

        let (a, b) = tokio::join!(
            WriteFileTool.execute(&slow, serde_json::json!({"path": "src/App.tsx", "content": "slow"})),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                WriteFileTool
                    .execute(&fast, serde_json::json!({"path": "src/App.tsx", "content": "fast"}))
                    .await
            }
        );
        assert!(a.unwrap().success);
        assert!(b.unwrap().success);

        let stored = store.read(&fx.ctx.workspace_id, "src/App.tsx").await.unwrap().unwrap();
        assert_eq!(stored, "fast");
        let committed = fx
            .tracker
            .current_fingerprint(&fx.ctx.workspace_id, "src/App.tsx")
            .await
            .unwrap();
        assert_eq!(committed, Some(fingerprint(&stored)));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let fx = Fixture::new();
        let err = WriteFileTool
            .execute(&fx.ctx, serde_json::json!({"path": "../secrets", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
