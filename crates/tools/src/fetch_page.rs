//! Page fetch tool — retrieve a web page as text.

use crate::args;
use crate::services::{self, ExternalService};
use crate::web_search::payload_output;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

pub struct FetchPageTool {
    service: Option<Arc<dyn ExternalService>>,
}

impl FetchPageTool {
    pub fn new(service: Option<Arc<dyn ExternalService>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch a web page over HTTP(S) and return its readable text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http:// or https:// URL"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let url = args::required_str(&arguments, "url")?.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!(
                "Only http and https URLs can be fetched, got '{url}'"
            )));
        }

        let payload = services::call(&self.service, self.name(), serde_json::json!({ "url": url })).await?;
        let text = payload["content"].as_str().map(str::to_string);
        match text {
            Some(text) => Ok(ToolOutput::ok_with_data(text, payload)),
            None => Ok(payload_output(payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::RecordingService;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn returns_page_content() {
        let fx = Fixture::new();
        let service = RecordingService::ok(serde_json::json!({
            "url": "https://ui.shadcn.com", "status": 200, "content": "Beautifully designed components"
        }));
        let out = FetchPageTool::new(Some(service))
            .execute(&fx.ctx, serde_json::json!({"url": "https://ui.shadcn.com"}))
            .await
            .unwrap();
        assert_eq!(out.output, "Beautifully designed components");
        assert_eq!(out.data.unwrap()["status"], 200);
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fx = Fixture::new();
        let service = RecordingService::ok(serde_json::json!({}));
        let err = FetchPageTool::new(Some(service.clone()))
            .execute(&fx.ctx, serde_json::json!({"url": "file:///etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn service_failure_surfaces_reason() {
        let fx = Fixture::new();
        let err = FetchPageTool::new(Some(RecordingService::failing("HTTP 503")))
            .execute(&fx.ctx, serde_json::json!({"url": "https://example.com"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }
}
