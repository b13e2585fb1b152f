//! Context caching for AppForge.
//!
//! Decides what the model sees ahead of the conversation on every turn and
//! how long each part of it may be cached upstream.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Classifier`] | Tiers items by path and recency |
//! | [`ChangeTracker`] | Fingerprints writes with compare-and-set, reports invalidated tiers |
//! | [`TemplateLibrary`] | Immutable scaffold and component sources |
//! | [`Predictor`] | Picks the components a request needs |
//! | [`ContextAssembler`] | Renders tiered cache blocks and reports efficiency |

pub mod assembler;
pub mod classifier;
pub mod library;
pub mod predictor;
pub mod token;
pub mod tracker;

pub use assembler::{
    Assembly, AssemblyError, AssemblyReport, CacheTtls, ContextAssembler, ContextBudget, ContextItem,
};
pub use classifier::{Classifier, ItemSource, TierRules};
pub use library::{LibraryFile, TemplateLibrary};
pub use predictor::{AppType, Prediction, Predictor};
pub use tracker::{ChangeKind, ChangeRecord, ChangeTracker, fingerprint};
