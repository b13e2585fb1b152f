//! Provider trait — the abstraction over the model transport.
//!
//! A Provider takes the assembled context blocks, the tool schema and the
//! conversation history, and returns exactly one assistant turn.
//!
//! Implementations: Anthropic Messages API, scripted mocks for tests.

use crate::cache::CacheBlock;
use crate::error::ProviderError;
use crate::message::{ContentBlock, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything sent to the model for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// The model to use
    pub model: String,

    /// Context blocks, most stable first
    pub context: Vec<CacheBlock>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Prior turns, oldest first
    pub history: Vec<Turn>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Extended reasoning, when enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

/// Extended reasoning settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub budget_tokens: u32,
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    /// Output was cut at the token limit; the turn may be incomplete.
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => Self::EndTurn,
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token usage information, including prompt-cache accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

/// One assistant turn as returned by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Ordered blocks exactly as the model produced them
    pub blocks: Vec<ContentBlock>,

    pub stop_reason: StopReason,

    #[serde(default)]
    pub usage: Usage,

    /// Which model actually responded
    pub model: String,
}

impl AssistantTurn {
    pub fn has_tool_use(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// The core Provider trait.
///
/// The orchestrator calls `send_turn()` without knowing which backend is
/// being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send one turn and wait for the complete assistant response.
    async fn send_turn(&self, request: TurnRequest) -> std::result::Result<AssistantTurn, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
