//! Tool trait — the abstraction over the generator's capabilities.
//!
//! Tools are what let the model act on the application workspace:
//! write and patch files, search them, manage dependencies, fetch pages,
//! generate images.

use crate::cache::{ChangeObserver, WriteOutcome};
use crate::error::ToolError;
use crate::message::{ContentBlock, WorkspaceId};
use crate::provider::ToolDefinition;
use crate::store::FileStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Marks a call that reads or writes the whole workspace.
pub const ALL_PATHS: &str = "*";

/// A decoded tool use, ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID (matches the model's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Payload on success, reason on failure
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn ok_with_data(output: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: Some(data),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            output: reason.into(),
            data: None,
        }
    }

    /// Wrap this output as the tool-result block answering `tool_use_id`.
    pub fn into_block(self, tool_use_id: impl Into<String>) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: self.output,
            is_error: !self.success,
        }
    }
}

/// Lifecycle of one tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Executing,
    Complete,
    Failed,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Audit record of one tool execution.
///
/// Moves pending → executing → complete|failed by value; a retry is a new
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ToolCallRecord {
    pub fn pending(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            status: ToolCallStatus::Pending,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn executing(mut self) -> Self {
        debug_assert_eq!(self.status, ToolCallStatus::Pending);
        self.status = ToolCallStatus::Executing;
        self.started_at = Some(Utc::now());
        self
    }

    /// Close the record with the handler's output.
    pub fn finish(mut self, output: ToolOutput) -> Self {
        debug_assert!(!self.status.is_terminal());
        self.status = if output.success {
            ToolCallStatus::Complete
        } else {
            ToolCallStatus::Failed
        };
        self.result = Some(output);
        self.finished_at = Some(Utc::now());
        self
    }

    /// The tool-result block for this record. Non-terminal records answer
    /// with an error so the pairing rule still holds.
    pub fn to_block(&self) -> ContentBlock {
        match &self.result {
            Some(output) => output.clone().into_block(&self.id),
            None => ToolOutput::error("tool call did not complete").into_block(&self.id),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }
}

/// Everything a handler may touch while executing one call.
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace being edited
    pub workspace_id: WorkspaceId,

    /// File store for the workspace
    pub store: Arc<dyn FileStore>,

    /// Change tracker to notify on every mutation
    pub changes: Arc<dyn ChangeObserver>,

    /// Components pulled in on demand; merged into the next assembly
    pub requested_components: Arc<Mutex<BTreeSet<String>>>,
}

impl ToolContext {
    pub fn new(
        workspace_id: WorkspaceId,
        store: Arc<dyn FileStore>,
        changes: Arc<dyn ChangeObserver>,
    ) -> Self {
        Self {
            workspace_id,
            store,
            changes,
            requested_components: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Persist a file and notify the change tracker before returning.
    ///
    /// The store write and the fingerprint commit run under the path's
    /// lock, so the committed fingerprint always describes what the store
    /// holds. Content identical to the stored file is not rewritten and
    /// keeps its modification time.
    pub async fn write_file(
        &self,
        tool_name: &str,
        path: &str,
        content: &str,
    ) -> Result<WriteOutcome, ToolError> {
        let _guard = self.changes.lock_path(&self.workspace_id, path).await;
        let stored = self.store.read(&self.workspace_id, path).await;
        if !matches!(stored, Ok(Some(ref existing)) if existing == content) {
            self.store
                .write(&self.workspace_id, path, content)
                .await
                .map_err(|e| failed(tool_name, e))?;
        }
        self.changes
            .record_write(&self.workspace_id, path, content)
            .await
            .map_err(|e| failed(tool_name, e))
    }

    /// Delete a file and notify the change tracker before returning.
    pub async fn delete_file(&self, tool_name: &str, path: &str) -> Result<WriteOutcome, ToolError> {
        let _guard = self.changes.lock_path(&self.workspace_id, path).await;
        self.store
            .delete(&self.workspace_id, path)
            .await
            .map_err(|e| failed(tool_name, e))?;
        self.changes
            .record_delete(&self.workspace_id, path)
            .await
            .map_err(|e| failed(tool_name, e))
    }

    /// Read a file, `None` when absent.
    pub async fn read_file(&self, tool_name: &str, path: &str) -> Result<Option<String>, ToolError> {
        self.store
            .read(&self.workspace_id, path)
            .await
            .map_err(|e| failed(tool_name, e))
    }

    /// Ask for a library component to be included from the next turn on.
    pub fn request_component(&self, name: &str) {
        if let Ok(mut set) = self.requested_components.lock() {
            set.insert(name.to_string());
        }
    }
}

fn failed(tool_name: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: e.to_string(),
    }
}

/// The core Tool trait.
///
/// Each handler (write_file, apply_patch, search_files, web_search, ...)
/// implements this trait and is registered under its builtin name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "write_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Workspace paths this call would touch. Calls with disjoint paths
    /// may run concurrently; [`ALL_PATHS`] conflicts with every call.
    fn touched_paths(&self, _arguments: &serde_json::Value) -> Vec<String> {
        Vec::new()
    }

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
