//! Error types for the AppForge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all AppForge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- File store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Change tracking errors ---
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    // --- Conversation protocol errors ---
    #[error("Conversation {0} is terminal and can no longer be changed")]
    ConversationTerminal(String),

    #[error("Message protocol violation: {0}")]
    Protocol(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether a retry with backoff may succeed.
    ///
    /// Rate limits, timeouts, dropped connections and server-side failures
    /// (5xx, Anthropic's 529 "overloaded") are transient. Everything else
    /// (bad credentials, invalid requests) fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_)
            | Self::InvalidRequest(_)
            | Self::NotConfigured(_)
            | Self::MalformedResponse(_) => false,
        }
    }

    /// How long the server asked us to wait before retrying.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(std::time::Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unsupported tool: {0}")]
    Unsupported(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Duplicate tool call id in flight: {0}")]
    DuplicateId(String),

    #[error("Service not configured: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("'{0}' is not UTF-8 text")]
    NotText(String),

    #[error("Key-value store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error)]
pub enum TrackerError {
    #[error("Fingerprint update for '{path}' lost {attempts} compare-and-set rounds")]
    Contention { path: String, attempts: u32 },

    #[error("Fingerprint store error: {0}")]
    Store(#[from] StoreError),
}
