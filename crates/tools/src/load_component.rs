//! Component loader — pull a library UI component into the conversation.
//!
//! Used when the predictor missed a component. The source is returned
//! right away and the component joins the context from the next
//! assembly on.

use crate::args;
use appforge_context::TemplateLibrary;
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LoadComponentTool {
    library: Arc<TemplateLibrary>,
}

impl LoadComponentTool {
    pub fn new(library: Arc<TemplateLibrary>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl Tool for LoadComponentTool {
    fn name(&self) -> &str {
        "load_component"
    }

    fn description(&self) -> &str {
        "Load a UI component from the component library so it can be imported. Returns its source."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let names: Vec<&str> = self.library.component_names().collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Component name",
                    "enum": names
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let name = args::required_str(&arguments, "name")?.trim().to_ascii_lowercase();
        let Some(file) = self.library.component(&name) else {
            let available: Vec<&str> = self.library.component_names().collect();
            return Ok(ToolOutput::error(format!(
                "Unknown component '{name}'. Available: {}",
                available.join(", ")
            )));
        };

        ctx.request_component(&name);
        Ok(ToolOutput::ok_with_data(
            format!("<file path=\"{}\">\n{}\n</file>", file.path, file.content),
            serde_json::json!({ "name": name, "path": file.path }),
        ))
    }
}
