//! Image tools — generate and edit images through the image services.
//!
//! The services return a URL (or other reference) the generated code can
//! embed; nothing is written to the workspace here.

use crate::args;
use crate::services::{self, ExternalService};
use crate::web_search::payload_output;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

const SIZES: &[&str] = &["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];

pub struct GenerateImageTool {
    service: Option<Arc<dyn ExternalService>>,
}

impl GenerateImageTool {
    pub fn new(service: Option<Arc<dyn ExternalService>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt. Returns a URL to use in the application."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What the image should show"
                },
                "size": {
                    "type": "string",
                    "enum": SIZES,
                    "default": "1024x1024"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let prompt = args::required_str(&arguments, "prompt")?;
        let size = arguments["size"].as_str().unwrap_or("1024x1024");
        if !SIZES.contains(&size) {
            return Err(ToolError::InvalidArguments(format!(
                "Unsupported size '{size}'; expected one of {}",
                SIZES.join(", ")
            )));
        }

        let payload = services::call(
            &self.service,
            self.name(),
            serde_json::json!({ "prompt": prompt, "size": size }),
        )
        .await?;
        Ok(payload_output(payload))
    }
}

pub struct EditImageTool {
    service: Option<Arc<dyn ExternalService>>,
}

impl EditImageTool {
    pub fn new(service: Option<Arc<dyn ExternalService>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for EditImageTool {
    fn name(&self) -> &str {
        "edit_image"
    }

    fn description(&self) -> &str {
        "Edit an existing image according to a text instruction. Returns a URL to the edited image."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "image_url": {
                    "type": "string",
                    "description": "URL of the image to edit"
                },
                "prompt": {
                    "type": "string",
                    "description": "The change to make"
                }
            },
            "required": ["image_url", "prompt"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let image_url = args::required_str(&arguments, "image_url")?;
        let prompt = args::required_str(&arguments, "prompt")?;

        let payload = services::call(
            &self.service,
            self.name(),
            serde_json::json!({ "image_url": image_url, "prompt": prompt }),
        )
        .await?;
        Ok(payload_output(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::RecordingService;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn generate_defaults_size() {
        let fx = Fixture::new();
        let service = RecordingService::ok(serde_json::json!({"url": "https://img.example/hero.png"}));
        let out = GenerateImageTool::new(Some(service.clone()))
            .execute(&fx.ctx, serde_json::json!({"prompt": "a calm beach"}))
            .await
            .unwrap();
        assert!(out.output.contains("hero.png"));
        assert_eq!(service.calls()[0]["size"], "1024x1024");
    }

    #[tokio::test]
    async fn generate_rejects_unknown_size() {
        let fx = Fixture::new();
        let err = GenerateImageTool::new(None)
            .execute(&fx.ctx, serde_json::json!({"prompt": "x", "size": "3x3"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn edit_requires_both_arguments() {
        let fx = Fixture::new();
        let service = RecordingService::ok(serde_json::json!({"url": "u"}));
        let err = EditImageTool::new(Some(service))
            .execute(&fx.ctx, serde_json::json!({"prompt": "make it blue"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("image_url"));
    }
}
