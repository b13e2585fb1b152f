//! Wiring shared by the commands.

use appforge_config::AppConfig;
use appforge_context::{ChangeTracker, Classifier, ContextAssembler, TemplateLibrary, TierRules};
use appforge_core::InMemoryKvStore;
use appforge_tools::LocalFileStore;
use std::path::PathBuf;
use std::sync::Arc;

/// The context side of a run: store, tracker and assembler over one
/// workspace root.
pub struct ContextStack {
    pub library: Arc<TemplateLibrary>,
    pub store: Arc<LocalFileStore>,
    pub tracker: Arc<ChangeTracker>,
    pub assembler: Arc<ContextAssembler>,
}

impl ContextStack {
    pub fn build(config: &AppConfig, root: PathBuf) -> Self {
        let library = Arc::new(TemplateLibrary::react_starter());
        let store = Arc::new(LocalFileStore::new(root));
        let tracker = Arc::new(
            ChangeTracker::new(
                Arc::new(InMemoryKvStore::new()),
                Classifier::new(TierRules::from_config(&config.cache)),
                config.tracker.cas_policy(),
            )
            .with_ttl(config.tracker.fingerprint_ttl()),
        );
        let assembler = Arc::new(
            ContextAssembler::new(library.clone(), store.clone(), tracker.clone())
                .with_config(&config.cache),
        );
        Self {
            library,
            store,
            tracker,
            assembler,
        }
    }
}

/// Load the configuration, naming the file on failure.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}
