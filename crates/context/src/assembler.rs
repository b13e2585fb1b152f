//! Context cache assembly.
//!
//! Builds the ordered context blocks sent ahead of the conversation history
//! on every turn:
//!
//! 1. Enumerate context items: instructions, library scaffold, the
//!    predicted subset of library components, and workspace files
//!    (workspace files override library files at the same path)
//! 2. Tier every item with the [`Classifier`] from path and recency
//! 3. Render one block per non-empty tier, most stable first, items in
//!    lexicographic path order (instructions lead the stable block)
//! 4. Attach the tier's cache lifetime
//! 5. Report cache efficiency and enforce the token budgets
//!
//! # Determinism
//!
//! Identical items and tiering rules always render byte-identical blocks,
//! so upstream prompt caches keep matching across turns. Nothing in the
//! rendering depends on wall-clock time; time only enters through tier
//! membership, and [`ContextAssembler::assemble_at`] makes it explicit.
//!
//! # Reuse
//!
//! A tier is reused from the previous assembly when its item set is the
//! same, the tracker reported no invalidation for it and every workspace
//! item in it is still fresh. Otherwise it is rebuilt from the store and
//! reported in [`AssemblyReport::rebuilt_tiers`].

use crate::classifier::{Classifier, ItemSource};
use crate::library::TemplateLibrary;
use crate::predictor::{AppType, Prediction, Predictor};
use crate::token;
use crate::tracker::{ChangeTracker, fingerprint};
use appforge_config::CacheConfig;
use appforge_core::cache::{CacheBlock, StabilityTier};
use appforge_core::error::{StoreError, TrackerError};
use appforge_core::message::{ConversationId, WorkspaceId};
use appforge_core::store::{FileStore, in_generated_dir};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Path under which the instructions appear in reports.
pub const INSTRUCTIONS_PATH: &str = "<instructions>";

/// Workspace files never sent as context.
const IGNORED_FILES: &[&str] = &["package-lock.json", "pnpm-lock.yaml", "yarn.lock"];
const IGNORED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "ico", "bmp", "mp3", "mp4", "webm", "wav", "woff",
    "woff2", "ttf", "otf", "eot", "pdf", "zip", "gz", "tar", "wasm",
];

/// One unit of context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    pub path: String,
    pub content: String,
    pub tier: StabilityTier,
    pub fingerprint: String,
}

/// Cache lifetime per tier. Volatile material is never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub stable: Duration,
    pub semi_stable: Duration,
    pub active: Duration,
}

impl CacheTtls {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            stable: Duration::from_secs(config.stable_ttl_secs),
            semi_stable: Duration::from_secs(config.semi_stable_ttl_secs),
            active: Duration::from_secs(config.active_ttl_secs),
        }
    }

    pub fn ttl(&self, tier: StabilityTier) -> Option<Duration> {
        match tier {
            StabilityTier::Stable => Some(self.stable),
            StabilityTier::SemiStable => Some(self.semi_stable),
            StabilityTier::Active => Some(self.active),
            StabilityTier::Volatile => None,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Context size limits in estimated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Above this, assembly succeeds with a warning
    pub warn_tokens: usize,
    /// Above this, assembly fails
    pub max_tokens: usize,
}

impl ContextBudget {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            warn_tokens: config.warn_tokens,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Blocks for one turn plus what it took to build them.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub blocks: Vec<CacheBlock>,
    pub report: AssemblyReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub total_tokens: usize,
    pub cacheable_tokens: usize,
    /// cacheable / total, 0.0 for empty context
    pub efficiency: f32,
    /// Tiers rendered fresh this turn
    pub rebuilt_tiers: Vec<StabilityTier>,
    /// Item paths per tier, in block order
    pub items: BTreeMap<StabilityTier, Vec<String>>,
    /// Components included, sorted
    pub components: Vec<String>,
    pub warnings: Vec<String>,
}

/// Errors from context assembly.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("No assembly session for conversation {0}")]
    UnknownConversation(ConversationId),

    #[error("Context of {total_tokens} tokens exceeds the hard limit of {max_tokens}")]
    OverBudget { total_tokens: usize, max_tokens: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

struct Session {
    workspace_id: WorkspaceId,
    prediction: Prediction,
    requested: BTreeSet<String>,
    previous: BTreeMap<StabilityTier, TierSnapshot>,
}

#[derive(Clone)]
struct TierSnapshot {
    block: CacheBlock,
    items: Vec<ItemRef>,
    /// Paths that made it into the block
    rendered: Vec<String>,
}

/// An item before its content is read.
#[derive(Debug, Clone)]
struct ItemRef {
    path: String,
    source: ItemSource,
    modified_at: Option<DateTime<Utc>>,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context cache assembler.
///
/// Holds one session per open conversation: the prediction made from its
/// request, components requested on demand, and the blocks sent last turn.
pub struct ContextAssembler {
    library: Arc<TemplateLibrary>,
    store: Arc<dyn FileStore>,
    tracker: Arc<ChangeTracker>,
    predictor: Predictor,
    ttls: CacheTtls,
    budget: ContextBudget,
    components_dir: String,
    sessions: Mutex<HashMap<ConversationId, Session>>,
}

impl ContextAssembler {
    pub fn new(
        library: Arc<TemplateLibrary>,
        store: Arc<dyn FileStore>,
        tracker: Arc<ChangeTracker>,
    ) -> Self {
        Self {
            library,
            store,
            tracker,
            predictor: Predictor::new(),
            ttls: CacheTtls::default(),
            budget: ContextBudget::default(),
            components_dir: CacheConfig::default().components_dir,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: &CacheConfig) -> Self {
        self.ttls = CacheTtls::from_config(config);
        self.budget = ContextBudget::from_config(config);
        self.components_dir = config.components_dir.clone();
        self
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    pub fn library(&self) -> &Arc<TemplateLibrary> {
        &self.library
    }

    fn classifier(&self) -> &Classifier {
        self.tracker.classifier()
    }

    /// Start a session for a conversation: predict its components from the
    /// request. Re-opening keeps on-demand requests and prior blocks.
    pub async fn open(
        &self,
        conversation_id: &ConversationId,
        workspace_id: &WorkspaceId,
        request: &str,
        current_app_type: Option<AppType>,
    ) -> Prediction {
        let prediction = self.predictor.predict(request, current_app_type);
        debug!(
            conversation_id = %conversation_id,
            app_type = %prediction.app_type,
            components = ?prediction.components,
            "Predicted components"
        );

        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(conversation_id.clone())
            .or_insert_with(|| Session {
                workspace_id: workspace_id.clone(),
                prediction: prediction.clone(),
                requested: BTreeSet::new(),
                previous: BTreeMap::new(),
            });
        session.prediction = prediction.clone();
        prediction
    }

    /// Drop a conversation's session.
    pub async fn close(&self, conversation_id: &ConversationId) {
        self.sessions.lock().await.remove(conversation_id);
    }

    pub async fn prediction(&self, conversation_id: &ConversationId) -> Option<Prediction> {
        self.sessions
            .lock()
            .await
            .get(conversation_id)
            .map(|s| s.prediction.clone())
    }

    /// Add components to a session beyond the prediction. Unknown names
    /// are ignored.
    pub async fn request_components<I, S>(
        &self,
        conversation_id: &ConversationId,
        names: I,
    ) -> Result<(), AssemblyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(conversation_id)
            .ok_or_else(|| AssemblyError::UnknownConversation(conversation_id.clone()))?;
        for name in names {
            let name = name.as_ref();
            if self.library.component(name).is_some() {
                session.requested.insert(name.to_string());
            }
        }
        Ok(())
    }

    /// Assemble the context blocks for the next turn.
    pub async fn assemble(&self, conversation_id: &ConversationId) -> Result<Assembly, AssemblyError> {
        self.assemble_at(conversation_id, Utc::now()).await
    }

    /// Assemble as of `now`; tier membership depends on recency.
    pub async fn assemble_at(
        &self,
        conversation_id: &ConversationId,
        now: DateTime<Utc>,
    ) -> Result<Assembly, AssemblyError> {
        let (workspace_id, selected, previous) = {
            let sessions = self.sessions.lock().await;
            let session = sessions
                .get(conversation_id)
                .ok_or_else(|| AssemblyError::UnknownConversation(conversation_id.clone()))?;
            let mut selected: BTreeSet<String> =
                session.prediction.components.iter().cloned().collect();
            selected.extend(session.requested.iter().cloned());
            (session.workspace_id.clone(), selected, session.previous.clone())
        };

        let tiers = self.enumerate(&workspace_id, &selected, now).await?;
        let invalidated = self.tracker.take_invalidations(&workspace_id);

        let mut blocks = Vec::new();
        let mut snapshots = BTreeMap::new();
        let mut rebuilt = Vec::new();
        let mut items_report = BTreeMap::new();

        for (tier, refs) in tiers {
            let reusable = match previous.get(&tier) {
                Some(prev) if !invalidated.contains(&tier) && same_items(&prev.items, &refs) => {
                    self.all_fresh(&workspace_id, &refs).await?
                }
                _ => false,
            };

            let (block, rendered) = match (reusable, previous.get(&tier)) {
                (true, Some(prev)) => (prev.block.clone(), prev.rendered.clone()),
                _ => {
                    rebuilt.push(tier);
                    match self.render(&workspace_id, tier, &refs).await? {
                        Some(rendered) => rendered,
                        None => continue,
                    }
                }
            };

            items_report.insert(tier, rendered.clone());
            snapshots.insert(
                tier,
                TierSnapshot {
                    block: block.clone(),
                    items: refs,
                    rendered,
                },
            );
            blocks.push(block);
        }

        let total_tokens: usize = blocks.iter().map(|b| b.token_estimate).sum();
        let cacheable_tokens: usize = blocks
            .iter()
            .filter(|b| b.is_cacheable())
            .map(|b| b.token_estimate)
            .sum();

        if total_tokens > self.budget.max_tokens {
            warn!(
                conversation_id = %conversation_id,
                total_tokens,
                max_tokens = self.budget.max_tokens,
                "Context exceeds hard limit"
            );
            return Err(AssemblyError::OverBudget {
                total_tokens,
                max_tokens: self.budget.max_tokens,
            });
        }

        let mut warnings = Vec::new();
        if total_tokens > self.budget.warn_tokens {
            warn!(
                conversation_id = %conversation_id,
                total_tokens,
                warn_tokens = self.budget.warn_tokens,
                "Context is over the warning budget"
            );
            warnings.push(format!(
                "context is {total_tokens} tokens, over the warning budget of {}",
                self.budget.warn_tokens
            ));
        }

        let efficiency = if total_tokens == 0 {
            0.0
        } else {
            cacheable_tokens as f32 / total_tokens as f32
        };

        if let Some(session) = self.sessions.lock().await.get_mut(conversation_id) {
            session.previous = snapshots;
        }

        debug!(
            conversation_id = %conversation_id,
            blocks = blocks.len(),
            total_tokens,
            efficiency,
            rebuilt = ?rebuilt,
            "Assembled context"
        );

        Ok(Assembly {
            blocks,
            report: AssemblyReport {
                total_tokens,
                cacheable_tokens,
                efficiency,
                rebuilt_tiers: rebuilt,
                items: items_report,
                components: selected.into_iter().collect(),
                warnings,
            },
        })
    }

    /// Enumerate and tier every item without reading workspace content.
    async fn enumerate(
        &self,
        workspace_id: &WorkspaceId,
        selected: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<StabilityTier, Vec<ItemRef>>, AssemblyError> {
        let mut by_path: BTreeMap<String, ItemRef> = BTreeMap::new();

        let library_files = self.library.scaffold().chain(
            selected
                .iter()
                .filter_map(|name| self.library.component(name)),
        );
        for file in library_files {
            by_path.insert(
                file.path.clone(),
                ItemRef {
                    path: file.path.clone(),
                    source: ItemSource::Library,
                    modified_at: None,
                },
            );
        }

        for stored in self.store.list(workspace_id, "").await? {
            if is_ignored(&stored.path) || !self.component_selected(&stored.path, selected) {
                continue;
            }
            by_path.insert(
                stored.path.clone(),
                ItemRef {
                    path: stored.path,
                    source: ItemSource::Workspace,
                    modified_at: Some(stored.modified_at),
                },
            );
        }

        let mut tiers: BTreeMap<StabilityTier, Vec<ItemRef>> = BTreeMap::new();
        tiers.entry(StabilityTier::Stable).or_default().push(ItemRef {
            path: INSTRUCTIONS_PATH.to_string(),
            source: ItemSource::Instructions,
            modified_at: None,
        });
        for (path, item) in by_path {
            let last_changed = match item.source {
                ItemSource::Workspace => match self.tracker.last_changed(workspace_id, &path) {
                    Some(at) => Some(at),
                    None => self
                        .tracker
                        .unchanged_since(workspace_id, &path)
                        .await?
                        .or(item.modified_at),
                },
                _ => None,
            };
            let tier = self.classifier().classify(&path, item.source, last_changed, now);
            tiers.entry(tier).or_default().push(item);
        }
        Ok(tiers)
    }

    /// Files in the components directory enter context only when selected.
    fn component_selected(&self, path: &str, selected: &BTreeSet<String>) -> bool {
        let Some(rest) = path.strip_prefix(self.components_dir.as_str()) else {
            return true;
        };
        let name = rest.rsplit_once('.').map_or(rest, |(stem, _)| stem);
        selected.contains(name)
    }

    async fn all_fresh(&self, workspace_id: &WorkspaceId, refs: &[ItemRef]) -> Result<bool, AssemblyError> {
        for item in refs.iter().filter(|r| r.source == ItemSource::Workspace) {
            if !self.tracker.is_fresh(workspace_id, &item.path).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read and render one tier, returning the block and the paths it
    /// holds. `None` when no item could be rendered.
    async fn render(
        &self,
        workspace_id: &WorkspaceId,
        tier: StabilityTier,
        refs: &[ItemRef],
    ) -> Result<Option<(CacheBlock, Vec<String>)>, AssemblyError> {
        let mut items = Vec::with_capacity(refs.len());
        for item in refs {
            let content = match item.source {
                ItemSource::Instructions => self.library.instructions().to_string(),
                ItemSource::Library => self
                    .library
                    .component_for_path(&item.path)
                    .and_then(|name| self.library.component(name))
                    .or_else(|| self.library.scaffold().find(|f| f.path == item.path))
                    .map(|f| f.content.to_string())
                    .unwrap_or_default(),
                ItemSource::Workspace => match self.store.read(workspace_id, &item.path).await {
                    Ok(Some(content)) => {
                        self.tracker
                            .observe_at(workspace_id, &item.path, &content, tier, item.modified_at)
                            .await?;
                        content
                    }
                    Ok(None) => continue,
                    Err(StoreError::NotText(path)) => {
                        warn!(workspace_id = %workspace_id, path = %path, "Skipping file that is not text");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            items.push(ContextItem {
                path: item.path.clone(),
                fingerprint: fingerprint(&content),
                content,
                tier,
            });
        }

        if items.is_empty() {
            return Ok(None);
        }
        let text = render_items(&items);
        let block = CacheBlock {
            tier,
            token_estimate: token::estimate_tokens(&text),
            cache_ttl: self.ttls.ttl(tier),
            text,
        };
        Ok(Some((block, items.into_iter().map(|i| i.path).collect())))
    }
}

fn is_ignored(path: &str) -> bool {
    let name = path.rsplit_once('/').map_or(path, |(_, name)| name);
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    in_generated_dir(path)
        || IGNORED_FILES.contains(&name)
        || extension.is_some_and(|ext| IGNORED_EXTENSIONS.contains(&ext.as_str()))
}

/// Same paths from the same sources, in the same order. Modification
/// times are left out; freshness is judged by fingerprint.
fn same_items(previous: &[ItemRef], current: &[ItemRef]) -> bool {
    previous.len() == current.len()
        && previous
            .iter()
            .zip(current)
            .all(|(a, b)| a.path == b.path && a.source == b.source)
}

/// Render items in the order given.
pub fn render_items(items: &[ContextItem]) -> String {
    let mut text = String::new();
    for item in items {
        if item.path == INSTRUCTIONS_PATH {
            text.push_str("<instructions>\n");
            text.push_str(&item.content);
            text.push_str("\n</instructions>\n");
        } else {
            text.push_str(&format!("<file path=\"{}\">\n", item.path));
            text.push_str(&item.content);
            if !item.content.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("</file>\n");
        }
    }
    text
}
