//! How a run ends.

use serde::{Deserialize, Serialize};

/// Why a run stopped short of completion. Both are recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    /// The conversation used its whole iteration budget.
    IterationLimit,
    /// Context plus history no longer fits the hard token limit.
    ContextBudget,
}

impl std::fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IterationLimit => f.write_str("iteration limit reached"),
            Self::ContextBudget => f.write_str("context budget exceeded"),
        }
    }
}

/// The terminal result of [`Orchestrator::run`](crate::Orchestrator::run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalResult {
    /// The model finished; `text` is its final answer.
    Completed { text: String, iterations: u32 },

    /// Stopped early. The conversation is left pending and can be resumed.
    Truncated {
        reason: TruncationReason,
        last_text: Option<String>,
        iterations: u32,
    },

    /// The model transport or the context pipeline failed for good.
    Failed { error: String, iterations: u32 },

    /// Cancelled between iterations.
    Cancelled { iterations: u32 },
}

impl TerminalResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Whether the conversation may be resumed.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    pub fn iterations(&self) -> u32 {
        match self {
            Self::Completed { iterations, .. }
            | Self::Truncated { iterations, .. }
            | Self::Failed { iterations, .. }
            | Self::Cancelled { iterations } => *iterations,
        }
    }
}
