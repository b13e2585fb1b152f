//! Shared fixtures for handler tests.

use appforge_context::{ChangeTracker, Classifier, TierRules};
use appforge_core::message::WorkspaceId;
use appforge_core::retry::RetryPolicy;
use appforge_core::store::{FileStore, InMemoryFileStore};
use appforge_core::tool::ToolContext;
use appforge_core::InMemoryKvStore;
use std::sync::Arc;

pub(crate) struct Fixture {
    pub ctx: ToolContext,
    pub store: Arc<InMemoryFileStore>,
    pub tracker: Arc<ChangeTracker>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryFileStore::new());
        let tracker = Arc::new(ChangeTracker::new(
            Arc::new(InMemoryKvStore::new()),
            Classifier::new(TierRules::default()),
            RetryPolicy::immediate(8),
        ));
        let ctx = ToolContext::new(WorkspaceId::from("ws"), store.clone(), tracker.clone());
        Self { ctx, store, tracker }
    }

    pub async fn seed(&self, path: &str, content: &str) {
        self.store
            .write(&self.ctx.workspace_id, path, content)
            .await
            .unwrap();
    }

    pub async fn read(&self, path: &str) -> Option<String> {
        self.store.read(&self.ctx.workspace_id, path).await.unwrap()
    }
}
