//! Progress events — fire-and-forget notifications for a UI layer.
//!
//! Publishing never blocks and never fails: a lagging or absent subscriber
//! only loses events.

use crate::cache::StabilityTier;
use crate::provider::{StopReason, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All progress events emitted while generating an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A tool call began executing
    ToolStarted {
        conversation_id: String,
        tool_use_id: String,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished
    ToolCompleted {
        conversation_id: String,
        tool_use_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The model answered one turn
    TurnCompleted {
        conversation_id: String,
        iteration: u32,
        stop_reason: StopReason,
        tool_calls: usize,
        usage: Usage,
        cache_efficiency: f32,
        rebuilt_tiers: Vec<StabilityTier>,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolCompleted { .. } => "tool_completed",
            Self::TurnCompleted { .. } => "turn_completed",
        }
    }
}

/// A broadcast-based event bus for progress events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ProgressEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ProgressEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
