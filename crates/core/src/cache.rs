//! Cache tiers, cache blocks and the change-notification seam.

use crate::error::TrackerError;
use crate::message::WorkspaceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How stable a piece of context is, most stable first.
///
/// The ordering is the order blocks are sent in: provider prompt caches
/// match on prefixes, so the least volatile material leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityTier {
    /// Instructions, shared templates, UI primitives
    Stable,
    /// Configuration and helpers that rarely change
    SemiStable,
    /// Project files in play, including the entry file
    Active,
    /// Anything just edited
    Volatile,
}

impl StabilityTier {
    pub const ALL: [StabilityTier; 4] = [
        StabilityTier::Stable,
        StabilityTier::SemiStable,
        StabilityTier::Active,
        StabilityTier::Volatile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::SemiStable => "semi_stable",
            Self::Active => "active",
            Self::Volatile => "volatile",
        }
    }
}

impl std::fmt::Display for StabilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous unit of context with its reuse lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBlock {
    pub tier: StabilityTier,
    pub text: String,
    pub token_estimate: usize,
    /// `None` means the block is never cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<Duration>,
}

impl CacheBlock {
    pub fn is_cacheable(&self) -> bool {
        self.cache_ttl.is_some()
    }
}

/// What a recorded write did to the fingerprint store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// False when the content hashed to the current fingerprint.
    pub changed: bool,
    /// The tier whose cache block the write invalidated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidated_tier: Option<StabilityTier>,
    /// Fingerprint after the write; `None` after a delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl WriteOutcome {
    pub fn unchanged(fingerprint: Option<String>) -> Self {
        Self {
            changed: false,
            invalidated_tier: None,
            fingerprint,
        }
    }
}

/// Held while one path's store mutation and its fingerprint commit run.
pub type PathGuard = tokio::sync::OwnedMutexGuard<()>;

/// Receives every file mutation a tool performs.
#[async_trait]
pub trait ChangeObserver: Send + Sync {
    /// Exclusive access to `path` until the guard drops. Writers take it
    /// before touching the store and release it after recording.
    async fn lock_path(&self, workspace: &WorkspaceId, path: &str) -> PathGuard;

    async fn record_write(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        content: &str,
    ) -> Result<WriteOutcome, TrackerError>;

    async fn record_delete(
        &self,
        workspace: &WorkspaceId,
        path: &str,
    ) -> Result<WriteOutcome, TrackerError>;
}
