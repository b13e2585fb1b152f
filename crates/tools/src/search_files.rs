//! Workspace search tool — find lines matching a literal or a regex.

use appforge_core::error::ToolError;
use appforge_core::tool::{ALL_PATHS, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use regex_lite::Regex;

const DEFAULT_MAX_RESULTS: usize = 50;
const MAX_LINE_CHARS: usize = 200;

pub struct SearchFilesTool;

enum Matcher {
    Literal(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal(needle) => line.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(line),
        }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search the files of the application workspace. Returns matching lines as path:line: text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to search for"
                },
                "regex": {
                    "type": "boolean",
                    "description": "Treat the query as a regular expression (default false)",
                    "default": false
                },
                "path_prefix": {
                    "type": "string",
                    "description": "Only search files under this prefix, e.g. src/components/"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum matching lines to return (default 50)",
                    "default": 50
                }
            },
            "required": ["query"]
        })
    }

    fn touched_paths(&self, _arguments: &serde_json::Value) -> Vec<String> {
        vec![ALL_PATHS.to_string()]
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let query = crate::args::required_str(&arguments, "query")?;
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("'query' must not be empty".into()));
        }
        let matcher = if arguments["regex"].as_bool().unwrap_or(false) {
            Matcher::Pattern(
                Regex::new(query)
                    .map_err(|e| ToolError::InvalidArguments(format!("Invalid regex: {e}")))?,
            )
        } else {
            Matcher::Literal(query.to_string())
        };
        let prefix = arguments["path_prefix"].as_str().unwrap_or("");
        let max_results = arguments["max_results"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 500);

        let files = ctx
            .store
            .list(&ctx.workspace_id, prefix)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let mut hits = Vec::new();
        let mut truncated = false;
        'files: for file in &files {
            let Some(content) = ctx.read_file(self.name(), &file.path).await? else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if !matcher.is_match(line) {
                    continue;
                }
                if hits.len() == max_results {
                    truncated = true;
                    break 'files;
                }
                let text: String = line.trim().chars().take(MAX_LINE_CHARS).collect();
                hits.push(format!("{}:{}: {}", file.path, i + 1, text));
            }
        }

        if hits.is_empty() {
            return Ok(ToolOutput::ok(format!(
                "No matches for '{query}' in {} file(s)",
                files.len()
            )));
        }
        let mut output = hits.join("\n");
        if truncated {
            output.push_str(&format!("\n[results truncated at {max_results} matches]"));
        }
        Ok(ToolOutput::ok_with_data(
            output,
            serde_json::json!({ "matches": hits.len(), "truncated": truncated }),
        ))
    }
}
