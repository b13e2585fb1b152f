//! Tool handlers and the tool execution engine for AppForge.
//!
//! Tools give the model the ability to act on the application workspace:
//! write, patch, rename and search files, manage npm dependencies, pull in
//! library components, and reach external services for web search, page
//! fetching, images and preview logs.
//!
//! Tool names are a closed set ([`BuiltinTool`]). The [`ToolEngine`]
//! executes one turn's calls against a [`ToolRegistry`] and always returns
//! one record per call.

mod args;

pub mod apply_patch;
pub mod delete_file;
pub mod dependencies;
pub mod engine;
pub mod fetch_page;
pub mod images;
pub mod load_component;
pub mod local_store;
pub mod read_file;
pub mod read_logs;
pub mod registry;
pub mod rename_file;
pub mod search_files;
pub mod services;
pub mod web_search;
pub mod write_file;

#[cfg(test)]
mod testing;

pub use engine::ToolEngine;
pub use local_store::LocalFileStore;
pub use registry::{BuiltinTool, ToolRegistry};
pub use services::{ExternalService, HttpPageFetcher, Services};
