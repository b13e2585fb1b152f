//! A file store rooted in a local directory.
//!
//! Each workspace is a subdirectory of the root; file paths are normalized
//! before they touch the filesystem so nothing can escape it.

use appforge_core::error::StoreError;
use appforge_core::message::WorkspaceId;
use appforge_core::store::{FileStore, StoredFile, in_generated_dir, normalize_path};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a workspace's files.
    pub fn workspace_dir(&self, workspace: &WorkspaceId) -> Result<PathBuf, StoreError> {
        let id = workspace.0.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(StoreError::InvalidPath {
                path: id.to_string(),
                reason: "invalid workspace id".into(),
            });
        }
        Ok(self.root.join(id))
    }

    fn resolve(&self, workspace: &WorkspaceId, path: &str) -> Result<(String, PathBuf), StoreError> {
        let path = normalize_path(path)?;
        let full = self.workspace_dir(workspace)?.join(&path);
        Ok((path, full))
    }
}

fn io_error(path: &str, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    }
}

/// Whether a listing under `prefix` needs to descend into `dir`.
/// Generated directories are skipped unless the prefix asks for them.
fn walks_into(dir: &str, prefix: &str) -> bool {
    let dir = format!("{dir}/");
    if prefix.starts_with(&dir) {
        return true;
    }
    dir.starts_with(prefix) && !in_generated_dir(&dir)
}

#[async_trait]
impl FileStore for LocalFileStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn read(&self, workspace: &WorkspaceId, path: &str) -> Result<Option<String>, StoreError> {
        let (path, full) = self.resolve(workspace, path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(StoreError::NotText(path)),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn write(&self, workspace: &WorkspaceId, path: &str, content: &str) -> Result<(), StoreError> {
        let (path, full) = self.resolve(workspace, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn delete(&self, workspace: &WorkspaceId, path: &str) -> Result<(), StoreError> {
        let (path, full) = self.resolve(workspace, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path)),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn list(&self, workspace: &WorkspaceId, prefix: &str) -> Result<Vec<StoredFile>, StoreError> {
        let base = self.workspace_dir(workspace)?;
        let mut files = Vec::new();
        let mut pending = vec![(base, String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&rel, e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&rel, e))? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let child = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                let file_type = entry.file_type().await.map_err(|e| io_error(&child, e))?;
                if file_type.is_dir() {
                    if walks_into(&child, prefix) {
                        pending.push((entry.path(), child));
                    }
                } else if file_type.is_file() && child.starts_with(prefix) {
                    let modified = entry
                        .metadata()
                        .await
                        .and_then(|m| m.modified())
                        .map_err(|e| io_error(&child, e))?;
                    files.push(StoredFile {
                        path: child,
                        modified_at: DateTime::<Utc>::from(modified),
                    });
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}
