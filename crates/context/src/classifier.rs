//! Stability classification of context items.
//!
//! The tier of an item is a pure function of where it comes from, its path
//! and how recently it last changed. The same inputs always yield the same
//! tier, which keeps block membership stable across turns.

use appforge_config::CacheConfig;
use appforge_core::cache::StabilityTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a context item comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    /// Generation instructions
    Instructions,
    /// The shared, immutable template library
    Library,
    /// The workspace's own file store
    Workspace,
}

/// Path heuristics and recency thresholds for tiering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRules {
    pub entry_files: Vec<String>,
    pub stable_prefixes: Vec<String>,
    pub semi_stable_patterns: Vec<String>,
    /// A file changed within this window is volatile
    pub volatile_window: Duration,
    /// A workspace file unchanged this long is promoted to semi-stable
    pub promote_after: Duration,
}

impl TierRules {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            entry_files: config.entry_files.clone(),
            stable_prefixes: config.stable_prefixes.clone(),
            semi_stable_patterns: config.semi_stable_patterns.clone(),
            volatile_window: Duration::from_secs(config.volatile_window_secs),
            promote_after: Duration::from_secs(config.promote_after_secs),
        }
    }
}

impl Default for TierRules {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Assigns a [`StabilityTier`] to every context item.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: TierRules,
}

impl Classifier {
    pub fn new(rules: TierRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &TierRules {
        &self.rules
    }

    /// Classify one item.
    ///
    /// `last_changed` is the most recent known modification; `None` means
    /// the item has no recorded history and is judged by path alone.
    pub fn classify(
        &self,
        path: &str,
        source: ItemSource,
        last_changed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StabilityTier {
        if source == ItemSource::Instructions {
            return StabilityTier::Stable;
        }

        let unchanged_for = last_changed.map(|at| unchanged_for(at, now));
        if let Some(age) = unchanged_for
            && age < self.rules.volatile_window
        {
            return StabilityTier::Volatile;
        }

        if source == ItemSource::Library || self.is_stable_path(path) {
            return StabilityTier::Stable;
        }
        if self.is_entry(path) {
            return StabilityTier::Active;
        }
        if self.is_semi_stable_path(path) {
            return StabilityTier::SemiStable;
        }

        match unchanged_for {
            Some(age) if age >= self.rules.promote_after => StabilityTier::SemiStable,
            _ => StabilityTier::Active,
        }
    }

    fn is_stable_path(&self, path: &str) -> bool {
        self.rules
            .stable_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn is_entry(&self, path: &str) -> bool {
        self.rules.entry_files.iter().any(|entry| entry == path)
    }

    fn is_semi_stable_path(&self, path: &str) -> bool {
        self.rules
            .semi_stable_patterns
            .iter()
            .any(|pattern| path.contains(pattern.as_str()))
    }
}

/// Time since `at`, zero if `at` lies in the future.
pub fn unchanged_for(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - at).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn classify(path: &str, source: ItemSource, minutes_ago: Option<i64>) -> StabilityTier {
        let now = Utc::now();
        let last = minutes_ago.map(|m| now - TimeDelta::minutes(m));
        Classifier::default().classify(path, source, last, now)
    }

    #[test]
    fn instructions_are_always_stable() {
        assert_eq!(
            classify("instructions", ItemSource::Instructions, Some(0)),
            StabilityTier::Stable
        );
    }

    #[test]
    fn library_and_ui_primitives_are_stable() {
        assert_eq!(classify("src/main.tsx", ItemSource::Library, None), StabilityTier::Stable);
        assert_eq!(
            classify("src/components/ui/button.tsx", ItemSource::Workspace, Some(60)),
            StabilityTier::Stable
        );
    }

    #[test]
    fn just_edited_is_volatile() {
        assert_eq!(
            classify("src/components/ui/button.tsx", ItemSource::Workspace, Some(0)),
            StabilityTier::Volatile
        );
        assert_eq!(classify("src/App.tsx", ItemSource::Workspace, Some(1)), StabilityTier::Volatile);
    }

    #[test]
    fn entry_file_is_active() {
        assert_eq!(classify("src/App.tsx", ItemSource::Workspace, Some(600)), StabilityTier::Active);
        assert_eq!(classify("src/App.tsx", ItemSource::Workspace, None), StabilityTier::Active);
    }

    #[test]
    fn configuration_is_semi_stable() {
        assert_eq!(classify("package.json", ItemSource::Workspace, None), StabilityTier::SemiStable);
        assert_eq!(
            classify("src/lib/utils.ts", ItemSource::Workspace, Some(10)),
            StabilityTier::SemiStable
        );
    }

    #[test]
    fn project_files_promote_after_threshold() {
        assert_eq!(
            classify("src/pages/Home.tsx", ItemSource::Workspace, Some(10)),
            StabilityTier::Active
        );
        assert_eq!(
            classify("src/pages/Home.tsx", ItemSource::Workspace, Some(45)),
            StabilityTier::SemiStable
        );
    }

    #[test]
    fn thresholds_are_configurable() {
        let rules = TierRules {
            volatile_window: Duration::from_secs(10),
            promote_after: Duration::from_secs(20),
            ..TierRules::default()
        };
        let now = Utc::now();
        let tier = Classifier::new(rules).classify(
            "src/pages/Home.tsx",
            ItemSource::Workspace,
            Some(now - TimeDelta::seconds(30)),
            now,
        );
        assert_eq!(tier, StabilityTier::SemiStable);
    }
}
