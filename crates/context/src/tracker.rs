//! Change tracking over a shared fingerprint store.
//!
//! Every file mutation goes through [`ChangeTracker::record_write`] or
//! [`ChangeTracker::record_delete`]. The tracker keeps one SHA-256
//! fingerprint per `(workspace, path)` in a [`KeyValueStore`] and commits
//! updates with compare-and-set, so concurrent writers to the same path
//! serialize on the store's version counter instead of clobbering each
//! other. Lost rounds are retried under the injected [`RetryPolicy`].
//!
//! Alongside the fingerprints it keeps an append-only change log per
//! workspace, the set of tiers invalidated since the last assembly, and
//! what the assembler last observed for each path.

use crate::classifier::{Classifier, ItemSource, unchanged_for};
use appforge_core::cache::{ChangeObserver, PathGuard, StabilityTier, WriteOutcome};
use appforge_core::error::{StoreError, TrackerError};
use appforge_core::kv::KeyValueStore;
use appforge_core::message::WorkspaceId;
use appforge_core::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Hex SHA-256 of file content.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn fingerprint_key(workspace: &WorkspaceId, path: &str) -> String {
    format!("fp:{workspace}:{path}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Write,
    Delete,
}

/// One committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
    /// Fingerprint after the change; `None` for deletes
    pub fingerprint: Option<String>,
    /// Store version the change committed at
    pub version: u64,
    /// Tier the change invalidated
    pub tier: StabilityTier,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct WorkspaceState {
    log: Vec<ChangeRecord>,
    latest: HashMap<String, (u64, DateTime<Utc>)>,
    observed: HashMap<String, Observation>,
    pending: BTreeSet<StabilityTier>,
}

struct Observation {
    fingerprint: String,
    tier: StabilityTier,
    /// Store modification time when this content was first observed
    modified_at: Option<DateTime<Utc>>,
}

/// Outcome of one compare-and-set round.
enum Commit {
    Unchanged,
    Applied { version: u64, existed: bool },
}

/// Why a round did not commit.
enum RoundError {
    Lost,
    Store(StoreError),
}

impl std::fmt::Display for RoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lost => f.write_str("compare-and-set lost to a concurrent writer"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

/// The change tracker.
pub struct ChangeTracker {
    kv: Arc<dyn KeyValueStore>,
    classifier: Classifier,
    policy: RetryPolicy,
    ttl: Option<Duration>,
    state: Mutex<HashMap<WorkspaceId, WorkspaceState>>,
    locks: Mutex<HashMap<(WorkspaceId, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl ChangeTracker {
    pub fn new(kv: Arc<dyn KeyValueStore>, classifier: Classifier, policy: RetryPolicy) -> Self {
        Self {
            kv,
            classifier,
            policy,
            ttl: None,
            state: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Expire fingerprints from the shared store after `ttl`.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn with_state<R>(&self, workspace: &WorkspaceId, f: impl FnOnce(&mut WorkspaceState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(state.entry(workspace.clone()).or_default())
    }

    /// Read-compute-commit under the retry policy.
    async fn commit(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        next: Option<&str>,
    ) -> Result<Commit, TrackerError> {
        let key = fingerprint_key(workspace, path);
        let result = self
            .policy
            .run(
                |attempt| {
                    let key = key.clone();
                    async move {
                        let current = self.kv.get(&key).await.map_err(RoundError::Store)?;
                        if current.value.as_deref() == next {
                            return Ok(Commit::Unchanged);
                        }
                        match self
                            .kv
                            .compare_and_set(&key, current.version, next, self.ttl)
                            .await
                            .map_err(RoundError::Store)?
                        {
                            Some(version) => Ok(Commit::Applied {
                                version,
                                existed: current.value.is_some(),
                            }),
                            None => {
                                debug!(path = %key, attempt, "Fingerprint commit lost a round");
                                Err(RoundError::Lost)
                            }
                        }
                    }
                },
                |e| matches!(e, RoundError::Lost),
            )
            .await;

        match result {
            Ok(commit) => Ok(commit),
            Err(RoundError::Lost) => {
                warn!(
                    workspace = %workspace,
                    path,
                    attempts = self.policy.max_attempts,
                    "Fingerprint update exhausted compare-and-set retries"
                );
                Err(TrackerError::Contention {
                    path: path.to_string(),
                    attempts: self.policy.max_attempts,
                })
            }
            Err(RoundError::Store(e)) => Err(TrackerError::Store(e)),
        }
    }

    /// Tier the path occupied before this change: what the assembler last
    /// placed it in, or a classification from its change history.
    fn prior_tier(&self, state: &WorkspaceState, path: &str, now: DateTime<Utc>) -> StabilityTier {
        match state.observed.get(path) {
            Some(observation) => observation.tier,
            None => {
                let last = state.latest.get(path).map(|(_, at)| *at);
                self.classifier
                    .classify(path, ItemSource::Workspace, last, now)
            }
        }
    }

    fn log_change(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        kind: ChangeKind,
        fingerprint: Option<String>,
        version: u64,
        existed: bool,
    ) -> StabilityTier {
        let now = Utc::now();
        self.with_state(workspace, |state| {
            let new_tier = self
                .classifier
                .classify(path, ItemSource::Workspace, Some(now), now);
            let tier = if existed {
                self.prior_tier(state, path, now)
            } else {
                new_tier
            };
            state.pending.insert(tier);
            if kind == ChangeKind::Write {
                state.pending.insert(new_tier);
            }

            let newest = state.latest.get(path).is_none_or(|(v, _)| *v < version);
            if newest {
                state.latest.insert(path.to_string(), (version, now));
            }

            // A slow committer may append after a later version of the same
            // path; keep per-path entries in version order.
            let record = ChangeRecord {
                path: path.to_string(),
                kind,
                fingerprint,
                version,
                tier,
                at: now,
            };
            let pos = state
                .log
                .iter()
                .position(|e| e.path == record.path && e.version > record.version)
                .unwrap_or(state.log.len());
            state.log.insert(pos, record);
            tier
        })
    }

    /// Record the content the assembler placed in `tier`, seeding the
    /// shared fingerprint when the path has none yet.
    pub async fn observe(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        content: &str,
        tier: StabilityTier,
    ) -> Result<(), TrackerError> {
        self.observe_at(workspace, path, content, tier, None).await
    }

    /// [`observe`](Self::observe), remembering the store modification
    /// time the content carried. Re-observing the same content keeps the
    /// earliest time, so a touch that leaves the bytes alone does not make
    /// the file look recently edited.
    pub async fn observe_at(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        content: &str,
        tier: StabilityTier,
        modified_at: Option<DateTime<Utc>>,
    ) -> Result<(), TrackerError> {
        let fp = fingerprint(content);
        let key = fingerprint_key(workspace, path);
        let current = self.kv.get(&key).await?;
        if current.value.is_none() {
            // Losing this race means a writer committed first; is_fresh
            // will report the difference.
            self.kv
                .compare_and_set(&key, current.version, Some(&fp), self.ttl)
                .await?;
        }
        self.with_state(workspace, |state| {
            let modified_at = match state.observed.get(path) {
                Some(prev) if prev.fingerprint == fp => match (prev.modified_at, modified_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                },
                _ => modified_at,
            };
            state.observed.insert(
                path.to_string(),
                Observation {
                    fingerprint: fp,
                    tier,
                    modified_at,
                },
            );
        });
        Ok(())
    }

    /// Modification time of the observed content of `path`, while that
    /// content is still the committed one.
    pub async fn unchanged_since(
        &self,
        workspace: &WorkspaceId,
        path: &str,
    ) -> Result<Option<DateTime<Utc>>, TrackerError> {
        let at = self.with_state(workspace, |state| {
            state.observed.get(path).and_then(|o| o.modified_at)
        });
        match at {
            Some(at) if self.is_fresh(workspace, path).await? => Ok(Some(at)),
            _ => Ok(None),
        }
    }

    /// Whether the content last observed for `path` is still current.
    pub async fn is_fresh(&self, workspace: &WorkspaceId, path: &str) -> Result<bool, TrackerError> {
        let observed = self.with_state(workspace, |state| {
            state.observed.get(path).map(|o| o.fingerprint.clone())
        });
        let Some(observed) = observed else {
            return Ok(false);
        };
        let current = self.kv.get(&fingerprint_key(workspace, path)).await?;
        Ok(current.value.as_deref() == Some(observed.as_str()))
    }

    /// Current fingerprint of a path in the shared store.
    pub async fn current_fingerprint(
        &self,
        workspace: &WorkspaceId,
        path: &str,
    ) -> Result<Option<String>, TrackerError> {
        Ok(self.kv.get(&fingerprint_key(workspace, path)).await?.value)
    }

    /// Drain the tiers invalidated since the last call.
    pub fn take_invalidations(&self, workspace: &WorkspaceId) -> BTreeSet<StabilityTier> {
        self.with_state(workspace, |state| std::mem::take(&mut state.pending))
    }

    /// The workspace's change log, oldest first.
    pub fn change_log(&self, workspace: &WorkspaceId) -> Vec<ChangeRecord> {
        self.with_state(workspace, |state| state.log.clone())
    }

    /// When this tracker last committed a change to `path`.
    pub fn last_changed(&self, workspace: &WorkspaceId, path: &str) -> Option<DateTime<Utc>> {
        self.with_state(workspace, |state| state.latest.get(path).map(|(_, at)| *at))
    }

    /// How long `path` has gone unchanged, if its history is known.
    pub fn stability_score(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        self.last_changed(workspace, path)
            .map(|at| unchanged_for(at, now))
    }
}

#[async_trait]
impl ChangeObserver for ChangeTracker {
    async fn lock_path(&self, workspace: &WorkspaceId, path: &str) -> PathGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry((workspace.clone(), path.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    async fn record_write(
        &self,
        workspace: &WorkspaceId,
        path: &str,
        content: &str,
    ) -> Result<WriteOutcome, TrackerError> {
        let fp = fingerprint(content);
        match self.commit(workspace, path, Some(&fp)).await? {
            Commit::Unchanged => {
                debug!(workspace = %workspace, path, "Write left content unchanged");
                Ok(WriteOutcome::unchanged(Some(fp)))
            }
            Commit::Applied { version, existed } => {
                let tier =
                    self.log_change(workspace, path, ChangeKind::Write, Some(fp.clone()), version, existed);
                debug!(workspace = %workspace, path, version, tier = %tier, "Recorded write");
                Ok(WriteOutcome {
                    changed: true,
                    invalidated_tier: Some(tier),
                    fingerprint: Some(fp),
                })
            }
        }
    }

    async fn record_delete(
        &self,
        workspace: &WorkspaceId,
        path: &str,
    ) -> Result<WriteOutcome, TrackerError> {
        match self.commit(workspace, path, None).await? {
            Commit::Unchanged => Ok(WriteOutcome::unchanged(None)),
            Commit::Applied { version, .. } => {
                let tier = self.log_change(workspace, path, ChangeKind::Delete, None, version, true);
                self.with_state(workspace, |state| state.observed.remove(path));
                debug!(workspace = %workspace, path, version, tier = %tier, "Recorded delete");
                Ok(WriteOutcome {
                    changed: true,
                    invalidated_tier: Some(tier),
                    fingerprint: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::kv::{InMemoryKvStore, Versioned};

    fn tracker() -> ChangeTracker {
        ChangeTracker::new(
            Arc::new(InMemoryKvStore::new()),
            Classifier::default(),
            RetryPolicy::immediate(8),
        )
    }

    fn ws() -> WorkspaceId {
        WorkspaceId::from("ws")
    }

    #[tokio::test]
    async fn identical_rewrite_is_unchanged() {
        let t = tracker();
        let first = t.record_write(&ws(), "src/App.tsx", "v1").await.unwrap();
        assert!(first.changed);
        t.take_invalidations(&ws());

        let second = t.record_write(&ws(), "src/App.tsx", "v1").await.unwrap();
        assert!(!second.changed);
        assert!(second.invalidated_tier.is_none());
        assert!(t.take_invalidations(&ws()).is_empty());
        assert_eq!(t.change_log(&ws()).len(), 1);
    }

    #[tokio::test]
    async fn rewrite_invalidates_prior_tier() {
        let t = tracker();
        t.observe(&ws(), "src/components/ui/button.tsx", "v1", StabilityTier::Stable)
            .await
            .unwrap();
        assert!(t.is_fresh(&ws(), "src/components/ui/button.tsx").await.unwrap());

        let outcome = t
            .record_write(&ws(), "src/components/ui/button.tsx", "v2")
            .await
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.invalidated_tier, Some(StabilityTier::Stable));
        assert!(!t.is_fresh(&ws(), "src/components/ui/button.tsx").await.unwrap());

        let pending = t.take_invalidations(&ws());
        assert!(pending.contains(&StabilityTier::Stable));
        assert!(pending.contains(&StabilityTier::Volatile));
    }

    #[tokio::test]
    async fn new_file_invalidates_its_new_tier() {
        let t = tracker();
        let outcome = t.record_write(&ws(), "src/pages/Home.tsx", "x").await.unwrap();
        assert_eq!(outcome.invalidated_tier, Some(StabilityTier::Volatile));
    }

    #[tokio::test]
    async fn delete_clears_fingerprint() {
        let t = tracker();
        t.record_write(&ws(), "a.ts", "x").await.unwrap();
        let outcome = t.record_delete(&ws(), "a.ts").await.unwrap();
        assert!(outcome.changed);
        assert!(t.current_fingerprint(&ws(), "a.ts").await.unwrap().is_none());

        let again = t.record_delete(&ws(), "a.ts").await.unwrap();
        assert!(!again.changed);
        let kinds: Vec<_> = t.change_log(&ws()).iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Write, ChangeKind::Delete]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_lose_no_update() {
        const WRITERS: usize = 16;
        let t = Arc::new(ChangeTracker::new(
            Arc::new(InMemoryKvStore::new()),
            Classifier::default(),
            RetryPolicy::immediate(WRITERS as u32 + 1),
        ));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let t = t.clone();
                tokio::spawn(async move {
                    t.record_write(&ws(), "src/App.tsx", &format!("content {i}")).await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().changed);
        }

        let log = t.change_log(&ws());
        assert_eq!(log.len(), WRITERS);
        let versions: Vec<u64> = log.iter().map(|r| r.version).collect();
        assert_eq!(versions, (1..=WRITERS as u64).collect::<Vec<_>>());

        let last = log.last().unwrap().fingerprint.clone();
        assert_eq!(t.current_fingerprint(&ws(), "src/App.tsx").await.unwrap(), last);
    }

    /// A store whose every compare-and-set loses.
    struct AlwaysContended;

    #[async_trait]
    impl KeyValueStore for AlwaysContended {
        fn name(&self) -> &str {
            "contended"
        }

        async fn get(&self, _key: &str) -> Result<Versioned, StoreError> {
            Ok(Versioned { value: None, version: 0 })
        }

        async fn compare_and_set(
            &self,
            _key: &str,
            _expected: u64,
            _value: Option<&str>,
            _ttl: Option<Duration>,
        ) -> Result<Option<u64>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_contention() {
        let t = ChangeTracker::new(
            Arc::new(AlwaysContended),
            Classifier::default(),
            RetryPolicy::immediate(3),
        );
        let err = t.record_write(&ws(), "src/App.tsx", "x").await.unwrap_err();
        assert!(matches!(err, TrackerError::Contention { attempts: 3, .. }));
        assert!(t.change_log(&ws()).is_empty());
    }

    #[tokio::test]
    async fn stability_score_grows_from_last_change() {
        let t = tracker();
        assert!(t.stability_score(&ws(), "a.ts", Utc::now()).is_none());
        t.record_write(&ws(), "a.ts", "x").await.unwrap();
        let later = Utc::now() + chrono::TimeDelta::minutes(5);
        let score = t.stability_score(&ws(), "a.ts", later).unwrap();
        assert!(score >= Duration::from_secs(299));
    }
}
