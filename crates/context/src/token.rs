//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Close enough
//! for budget checks and the cache-efficiency ratio, both of which only
//! compare estimates against each other or against generous limits.

use appforge_core::message::Turn;
use appforge_core::provider::ToolDefinition;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for the conversation history, with a small per-turn
/// overhead for role and block framing.
pub fn estimate_history_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(|t| 4 + t.estimated_tokens()).sum()
}

/// Estimate tokens for a slice of tool definitions (serialized as JSON).
pub fn estimate_tools_tokens(tools: &[ToolDefinition]) -> usize {
    tools
        .iter()
        .map(|t| estimate_tokens(&serde_json::to_string(t).unwrap_or_default()))
        .sum()
}
