//! File store — where generated application files live.
//!
//! Every operation is keyed by workspace. Paths are workspace-relative,
//! `/`-separated, and may not escape the workspace.

use crate::error::StoreError;
use crate::message::WorkspaceId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Directories holding installed or built output rather than sources.
pub const GENERATED_DIRS: &[&str] = &["node_modules", "dist", "build", ".git", ".next", ".vite", ".turbo"];

/// Whether any directory on `path` is one of [`GENERATED_DIRS`].
pub fn in_generated_dir(path: &str) -> bool {
    let dirs = path.rsplit_once('/').map_or("", |(dir, _)| dir);
    dirs.split('/').any(|d| GENERATED_DIRS.contains(&d))
}

/// A listed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub path: String,
    pub modified_at: DateTime<Utc>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Read a file. `Ok(None)` when it does not exist.
    async fn read(&self, workspace: &WorkspaceId, path: &str) -> Result<Option<String>, StoreError>;

    /// Create or overwrite a file.
    async fn write(&self, workspace: &WorkspaceId, path: &str, content: &str) -> Result<(), StoreError>;

    /// Delete a file. Deleting a missing file is `NotFound`.
    async fn delete(&self, workspace: &WorkspaceId, path: &str) -> Result<(), StoreError>;

    /// List files under a path prefix ("" lists everything), sorted by path.
    async fn list(&self, workspace: &WorkspaceId, prefix: &str) -> Result<Vec<StoredFile>, StoreError>;
}

/// Normalize a workspace-relative path.
///
/// Rejects empty paths, absolute paths and any `..` component; strips a
/// leading `./` and converts `\` separators.
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let unified = path.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(invalid("path is empty"));
    }
    if unified.starts_with('/') || unified.chars().nth(1) == Some(':') {
        return Err(invalid("path must be relative to the workspace"));
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid("path traversal is not allowed")),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(parts.join("/"))
}

struct StoredContent {
    content: String,
    modified_at: DateTime<Utc>,
}

/// An in-memory store. Useful for tests and ephemeral sessions.
pub struct InMemoryFileStore {
    files: RwLock<BTreeMap<(WorkspaceId, String), StoredContent>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Write a file with an explicit modification time.
    pub async fn write_at(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        content: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        self.files.write().await.insert(
            (workspace.clone(), path),
            StoredContent {
                content: content.to_string(),
                modified_at,
            },
        );
        Ok(())
    }
}

impl Default for InMemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn read(&self, workspace: &WorkspaceId, path: &str) -> Result<Option<String>, StoreError> {
        let path = normalize_path(path)?;
        Ok(self
            .files
            .read()
            .await
            .get(&(workspace.clone(), path))
            .map(|f| f.content.clone()))
    }

    async fn write(&self, workspace: &WorkspaceId, path: &str, content: &str) -> Result<(), StoreError> {
        self.write_at(workspace, path, content, Utc::now()).await
    }

    async fn delete(&self, workspace: &WorkspaceId, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        match self.files.write().await.remove(&(workspace.clone(), path.clone())) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(path)),
        }
    }

    async fn list(&self, workspace: &WorkspaceId, prefix: &str) -> Result<Vec<StoredFile>, StoreError> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .filter(|((ws, path), _)| ws == workspace && path.starts_with(prefix))
            .map(|((_, path), f)| StoredFile {
                path: path.clone(),
                modified_at: f.modified_at,
            })
            .collect())
    }
}
