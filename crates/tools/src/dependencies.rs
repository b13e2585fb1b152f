//! Dependency tools — add and remove npm packages in `package.json`.
//!
//! Edits go through the file store and the change tracker like any other
//! write. Versions come from the resolver service when one is configured,
//! otherwise `latest`.

use crate::services::{self, ExternalService};
use appforge_core::error::ToolError;
use appforge_core::tool::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

const MANIFEST: &str = "package.json";
const SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// npm package name rules: optional scope, lowercase, URL-safe.
fn validate_package_name(name: &str) -> Result<(), ToolError> {
    let valid = !name.is_empty()
        && name.len() <= 214
        && !name.starts_with('.')
        && !name.starts_with('_')
        && match name.strip_prefix('@') {
            Some(scoped) => scoped
                .split_once('/')
                .is_some_and(|(scope, pkg)| is_name_part(scope) && is_name_part(pkg)),
            None => is_name_part(name),
        };
    if valid {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!("Invalid package name '{name}'")))
    }
}

fn is_name_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_' | '~'))
}

fn package_name(arguments: &Value) -> Result<&str, ToolError> {
    let name = crate::args::required_str(arguments, "name")?.trim();
    validate_package_name(name)?;
    Ok(name)
}

async fn read_manifest(ctx: &ToolContext, tool_name: &str) -> Result<Option<Map<String, Value>>, ToolError> {
    let Some(raw) = ctx.read_file(tool_name, MANIFEST).await? else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        _ => Err(ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: format!("{MANIFEST} is not a JSON object"),
        }),
    }
}

async fn write_manifest(
    ctx: &ToolContext,
    tool_name: &str,
    manifest: Map<String, Value>,
) -> Result<(), ToolError> {
    let mut text = serde_json::to_string_pretty(&Value::Object(manifest)).map_err(|e| {
        ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        }
    })?;
    text.push('\n');
    ctx.write_file(tool_name, MANIFEST, &text).await?;
    Ok(())
}

pub struct AddDependencyTool {
    resolver: Option<Arc<dyn ExternalService>>,
}

impl AddDependencyTool {
    pub fn new(resolver: Option<Arc<dyn ExternalService>>) -> Self {
        Self { resolver }
    }

    async fn resolve_version(&self, name: &str) -> String {
        if self.resolver.is_none() {
            return "latest".to_string();
        }
        match services::call(&self.resolver, "dependency_resolver", serde_json::json!({ "name": name })).await {
            Ok(payload) => payload["version"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| "latest".to_string()),
            Err(e) => {
                warn!(package = name, error = %e, "Version resolution failed, using latest");
                "latest".to_string()
            }
        }
    }
}

#[async_trait]
impl Tool for AddDependencyTool {
    fn name(&self) -> &str {
        "add_dependency"
    }

    fn description(&self) -> &str {
        "Add an npm package to package.json. Omit the version to pin the current release."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Package name, e.g. date-fns or @tanstack/react-query"
                },
                "version": {
                    "type": "string",
                    "description": "Version range, e.g. ^3.6.0"
                },
                "dev": {
                    "type": "boolean",
                    "description": "Add to devDependencies instead of dependencies",
                    "default": false
                }
            },
            "required": ["name"]
        })
    }

    fn touched_paths(&self, _arguments: &Value) -> Vec<String> {
        vec![MANIFEST.to_string()]
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolOutput, ToolError> {
        let name = package_name(&arguments)?;
        let section = if arguments["dev"].as_bool().unwrap_or(false) {
            SECTIONS[1]
        } else {
            SECTIONS[0]
        };
        let version = match arguments["version"].as_str().map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => self.resolve_version(name).await,
        };

        let Some(mut manifest) = read_manifest(ctx, self.name()).await? else {
            return Ok(ToolOutput::error(format!("{MANIFEST} not found")));
        };

        // A package lives in exactly one section.
        for other in SECTIONS.iter().filter(|s| **s != section) {
            if let Some(Value::Object(deps)) = manifest.get_mut(*other) {
                deps.remove(name);
            }
        }
        let entry = manifest
            .entry(section)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(deps) = entry else {
            return Ok(ToolOutput::error(format!("'{section}' in {MANIFEST} is not an object")));
        };
        let previous = deps.insert(name.to_string(), Value::String(version.clone()));

        write_manifest(ctx, self.name(), manifest).await?;
        let output = match previous.as_ref().and_then(Value::as_str) {
            Some(old) if old != version => format!("Updated {name} from {old} to {version} in {section}"),
            _ => format!("Added {name}@{version} to {section}"),
        };
        Ok(ToolOutput::ok_with_data(
            output,
            serde_json::json!({ "name": name, "version": version, "section": section }),
        ))
    }
}

pub struct RemoveDependencyTool;

#[async_trait]
impl Tool for RemoveDependencyTool {
    fn name(&self) -> &str {
        "remove_dependency"
    }

    fn description(&self) -> &str {
        "Remove an npm package from package.json."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Package name"
                }
            },
            "required": ["name"]
        })
    }

    fn touched_paths(&self, _arguments: &Value) -> Vec<String> {
        vec![MANIFEST.to_string()]
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolOutput, ToolError> {
        let name = package_name(&arguments)?;
        let Some(mut manifest) = read_manifest(ctx, self.name()).await? else {
            return Ok(ToolOutput::error(format!("{MANIFEST} not found")));
        };

        let mut removed_from = Vec::new();
        for section in SECTIONS {
            if let Some(Value::Object(deps)) = manifest.get_mut(section)
                && deps.remove(name).is_some()
            {
                removed_from.push(section);
            }
        }
        if removed_from.is_empty() {
            return Ok(ToolOutput::error(format!("{name} is not a dependency")));
        }

        write_manifest(ctx, self.name(), manifest).await?;
        Ok(ToolOutput::ok(format!(
            "Removed {name} from {}",
            removed_from.join(" and ")
        )))
    }
}
