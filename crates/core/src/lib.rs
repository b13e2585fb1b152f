//! # AppForge Core
//!
//! Domain types, traits, and error definitions for the AppForge
//! application-generation engine. This crate has **no framework
//! dependencies**: it defines the domain model that every other crate
//! implements against.
//!
//! Every external collaborator (model transport, file store, fingerprint
//! store, change observer) is a trait here. Implementations live in their
//! respective crates, and tests swap in the in-memory ones.

pub mod cache;
pub mod error;
pub mod event;
pub mod kv;
pub mod message;
pub mod provider;
pub mod retry;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheBlock, ChangeObserver, StabilityTier, WriteOutcome};
pub use error::{Error, Result};
pub use event::{EventBus, ProgressEvent};
pub use kv::{InMemoryKvStore, KeyValueStore, Versioned};
pub use message::{ContentBlock, Conversation, ConversationId, ConversationStatus, Role, Turn, WorkspaceId};
pub use provider::{AssistantTurn, Provider, StopReason, ThinkingConfig, ToolDefinition, TurnRequest, Usage};
pub use retry::RetryPolicy;
pub use store::{FileStore, InMemoryFileStore, StoredFile};
pub use tool::{Tool, ToolCall, ToolCallRecord, ToolCallStatus, ToolContext, ToolOutput};
