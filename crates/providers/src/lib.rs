//! Model transport implementations for AppForge.
//!
//! All providers implement the `appforge_core::Provider` trait.
//! [`RetryingProvider`] wraps any of them with bounded retry and per-attempt
//! timeouts.

pub mod anthropic;
pub mod retrying;

pub use anthropic::AnthropicProvider;
pub use retrying::RetryingProvider;
