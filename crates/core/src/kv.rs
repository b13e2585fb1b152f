//! Shared key-value store with atomic compare-and-set.
//!
//! The change tracker keeps file fingerprints here. Every key carries a
//! version that only ever grows, including across deletes and expiry, so a
//! successful compare-and-set also yields a total commit order per key.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// `None` when the key was never set, was deleted, or expired.
    pub value: Option<String>,
    /// 0 for a key that was never written.
    pub version: u64,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    /// Read the current value and version of `key`.
    async fn get(&self, key: &str) -> Result<Versioned, StoreError>;

    /// Replace the value of `key` if its version is still `expected`.
    ///
    /// `value = None` deletes. Returns the new version on success and
    /// `None` when another writer committed first.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: u64,
        value: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<Option<u64>, StoreError>;
}

struct Entry {
    value: Option<String>,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live_value(&self, now: Instant) -> Option<String> {
        match self.expires_at {
            Some(at) if at <= now => None,
            _ => self.value.clone(),
        }
    }
}

/// Process-local store, linearizable per key behind one mutex.
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        let entries = self.entries.lock().await;
        Ok(match entries.get(key) {
            Some(entry) => Versioned {
                value: entry.live_value(Instant::now()),
                version: entry.version,
            },
            None => Versioned {
                value: None,
                version: 0,
            },
        })
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: u64,
        value: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<Option<u64>, StoreError> {
        let mut entries = self.entries.lock().await;
        let current = entries.get(key).map(|e| e.version).unwrap_or(0);
        if current != expected {
            return Ok(None);
        }

        let version = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.map(str::to_string),
                version,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(Some(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cas_succeeds_on_expected_version() {
        let kv = InMemoryKvStore::new();
        assert_eq!(kv.get("k").await.unwrap().version, 0);
        assert_eq!(kv.compare_and_set("k", 0, Some("a"), None).await.unwrap(), Some(1));

        let read = kv.get("k").await.unwrap();
        assert_eq!(read.value.as_deref(), Some("a"));
        assert_eq!(read.version, 1);
    }

    #[tokio::test]
    async fn stale_cas_loses() {
        let kv = InMemoryKvStore::new();
        kv.compare_and_set("k", 0, Some("a"), None).await.unwrap();
        assert_eq!(kv.compare_and_set("k", 0, Some("b"), None).await.unwrap(), None);
        assert_eq!(kv.get("k").await.unwrap().value.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn delete_keeps_version_monotonic() {
        let kv = InMemoryKvStore::new();
        kv.compare_and_set("k", 0, Some("a"), None).await.unwrap();
        assert_eq!(kv.compare_and_set("k", 1, None, None).await.unwrap(), Some(2));

        let read = kv.get("k").await.unwrap();
        assert!(read.value.is_none());
        assert_eq!(read.version, 2);
        assert_eq!(kv.compare_and_set("k", 2, Some("b"), None).await.unwrap(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_value_but_not_version() {
        let kv = InMemoryKvStore::new();
        kv.compare_and_set("k", 0, Some("a"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let read = kv.get("k").await.unwrap();
        assert!(read.value.is_none());
        assert_eq!(read.version, 1);
    }
}
