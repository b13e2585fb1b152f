//! Turn and Conversation domain types.
//!
//! A conversation is the ordered record of every request/response unit
//! exchanged with the model while generating one application. Each turn is
//! a list of typed content blocks: text, extended thinking, tool use and
//! tool result.
//!
//! The pairing rule of the wire protocol is enforced on append: tool
//! results must lead their turn and must answer tool uses of the
//! immediately preceding assistant turn.

use crate::error::{Error, Result};
use crate::tool::{ToolCall, ToolCallRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a conversation (one unit of work).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the application workspace whose files a conversation edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The requester, and the carrier of tool results
    User,
    /// The model
    Assistant,
}

/// One typed block of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },

    /// Extended reasoning. The signature is opaque and must be sent back
    /// byte-for-byte on later turns.
    Thinking { thinking: String, signature: String },

    /// A request from the model to invoke a tool.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The outcome of a tool use, correlated by id.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// One request/response unit with the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// Ordered content blocks
    pub blocks: Vec<ContentBlock>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn with_blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            blocks,
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn holding a single text block.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create an assistant turn from the blocks the model returned.
    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::Assistant, blocks)
    }

    /// Create the user turn that answers a tool-using assistant turn.
    ///
    /// Result blocks come first, optionally followed by a text note.
    pub fn tool_results(results: Vec<ContentBlock>, note: Option<String>) -> Self {
        let mut blocks = results;
        if let Some(note) = note {
            blocks.push(ContentBlock::text(note));
        }
        Self::with_blocks(Role::User, blocks)
    }

    /// Tool uses in this turn, in block order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.len(),
                ContentBlock::Thinking { thinking, .. } => thinking.len(),
                ContentBlock::ToolUse { input, .. } => input.to_string().len(),
                ContentBlock::ToolResult { content, .. } => content.len(),
            })
            .sum::<usize>()
            / 4
    }
}

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ConversationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A conversation is an ordered, append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Workspace whose files this conversation edits
    pub workspace_id: WorkspaceId,

    /// Ordered turns
    turns: Vec<Turn>,

    /// Model round-trips made so far
    iteration_count: u32,

    /// Lifecycle state
    status: ConversationStatus,

    /// Every tool execution, in execution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallRecord>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new pending conversation for a workspace.
    pub fn new(workspace_id: WorkspaceId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            workspace_id,
            turns: Vec::new(),
            iteration_count: 0,
            status: ConversationStatus::Pending,
            tool_calls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fork a new pending conversation carrying the turns of `previous`.
    ///
    /// Used to pick up after a failed run: the failed conversation stays
    /// immutable and the fork starts with a fresh iteration budget.
    pub fn resume_from(previous: &Conversation) -> Self {
        let mut fork = Self::new(previous.workspace_id.clone());
        fork.turns = previous.turns.clone();
        fork
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn tool_call_records(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    fn ensure_open(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::ConversationTerminal(self.id.to_string()));
        }
        Ok(())
    }

    /// Append a turn, enforcing the tool-result pairing rule.
    pub fn push(&mut self, turn: Turn) -> Result<()> {
        self.ensure_open()?;
        self.check_pairing(&turn)?;
        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    fn check_pairing(&self, turn: &Turn) -> Result<()> {
        let leading = turn
            .blocks
            .iter()
            .take_while(|b| b.is_tool_result())
            .count();
        let total = turn.blocks.iter().filter(|b| b.is_tool_result()).count();

        if total == 0 {
            return Ok(());
        }
        if turn.role != Role::User {
            return Err(Error::Protocol("tool results must be sent in a user turn".into()));
        }
        if leading != total {
            return Err(Error::Protocol(
                "tool result blocks must be the first blocks of their turn".into(),
            ));
        }

        let Some(previous) = self.turns.last().filter(|t| t.role == Role::Assistant) else {
            return Err(Error::Protocol(
                "tool results must follow an assistant turn".into(),
            ));
        };
        let expected: HashSet<String> = previous.tool_calls().into_iter().map(|c| c.id).collect();
        for block in &turn.blocks[..leading] {
            if let ContentBlock::ToolResult { tool_use_id, .. } = block
                && !expected.contains(tool_use_id)
            {
                return Err(Error::Protocol(format!(
                    "tool result '{tool_use_id}' has no matching tool use in the preceding turn"
                )));
            }
        }
        Ok(())
    }

    /// Record a terminal tool execution.
    pub fn record_tool_call(&mut self, record: ToolCallRecord) -> Result<()> {
        self.ensure_open()?;
        self.tool_calls.push(record);
        Ok(())
    }

    /// Count one more model round-trip, refusing to pass `max`.
    pub fn begin_iteration(&mut self, max: u32) -> Result<u32> {
        self.ensure_open()?;
        if self.iteration_count >= max {
            return Err(Error::Internal(format!(
                "iteration limit {max} reached for conversation {}",
                self.id
            )));
        }
        self.iteration_count += 1;
        Ok(self.iteration_count)
    }

    pub fn mark_running(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = ConversationStatus::Running;
        Ok(())
    }

    /// Return to pending (non-terminal); used when a run stops early but
    /// may be resumed.
    pub fn mark_pending(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = ConversationStatus::Pending;
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = ConversationStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = ConversationStatus::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Text of the most recent assistant turn, if any.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(Turn::text)
    }

    /// The first user text of the conversation.
    pub fn initial_request(&self) -> Option<String> {
        self.turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(Turn::text)
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(Turn::estimated_tokens).sum()
    }
}
