//! The closed set of builtin tools and their handler table.
//!
//! Tool names coming back from the model are resolved against
//! [`BuiltinTool`]; anything outside it is unsupported. A registry may hold
//! fewer handlers than there are builtins, but never a handler for a name
//! outside the set.

use crate::dependencies::{AddDependencyTool, RemoveDependencyTool};
use crate::services::Services;
use crate::{
    apply_patch, delete_file, fetch_page, images, load_component, read_file, read_logs, rename_file,
    search_files, web_search, write_file,
};
use appforge_context::TemplateLibrary;
use appforge_core::error::ToolError;
use appforge_core::provider::ToolDefinition;
use appforge_core::tool::Tool;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuiltinTool {
    WriteFile,
    ReadFile,
    DeleteFile,
    RenameFile,
    ApplyPatch,
    SearchFiles,
    LoadComponent,
    AddDependency,
    RemoveDependency,
    WebSearch,
    FetchPage,
    GenerateImage,
    EditImage,
    ReadLogs,
}

impl BuiltinTool {
    pub const ALL: [Self; 14] = [
        Self::WriteFile,
        Self::ReadFile,
        Self::DeleteFile,
        Self::RenameFile,
        Self::ApplyPatch,
        Self::SearchFiles,
        Self::LoadComponent,
        Self::AddDependency,
        Self::RemoveDependency,
        Self::WebSearch,
        Self::FetchPage,
        Self::GenerateImage,
        Self::EditImage,
        Self::ReadLogs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteFile => "write_file",
            Self::ReadFile => "read_file",
            Self::DeleteFile => "delete_file",
            Self::RenameFile => "rename_file",
            Self::ApplyPatch => "apply_patch",
            Self::SearchFiles => "search_files",
            Self::LoadComponent => "load_component",
            Self::AddDependency => "add_dependency",
            Self::RemoveDependency => "remove_dependency",
            Self::WebSearch => "web_search",
            Self::FetchPage => "fetch_page",
            Self::GenerateImage => "generate_image",
            Self::EditImage => "edit_image",
            Self::ReadLogs => "read_logs",
        }
    }

    /// Whether the handler can modify workspace files.
    pub fn mutates_workspace(self) -> bool {
        matches!(
            self,
            Self::WriteFile
                | Self::DeleteFile
                | Self::RenameFile
                | Self::ApplyPatch
                | Self::AddDependency
                | Self::RemoveDependency
        )
    }
}

impl std::fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuiltinTool {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ToolError::Unsupported(s.to_string()))
    }
}

/// Handlers keyed by builtin tool.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<BuiltinTool, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every builtin handler.
    pub fn builtin(library: Arc<TemplateLibrary>, services: Services) -> Self {
        let handlers: Vec<Arc<dyn Tool>> = vec![
            Arc::new(write_file::WriteFileTool),
            Arc::new(read_file::ReadFileTool),
            Arc::new(delete_file::DeleteFileTool),
            Arc::new(rename_file::RenameFileTool),
            Arc::new(apply_patch::ApplyPatchTool),
            Arc::new(search_files::SearchFilesTool),
            Arc::new(load_component::LoadComponentTool::new(library)),
            Arc::new(AddDependencyTool::new(services.dependency_resolver)),
            Arc::new(RemoveDependencyTool),
            Arc::new(web_search::WebSearchTool::new(services.web_search)),
            Arc::new(fetch_page::FetchPageTool::new(services.page_fetch)),
            Arc::new(images::GenerateImageTool::new(services.image_generate)),
            Arc::new(images::EditImageTool::new(services.image_edit)),
            Arc::new(read_logs::ReadLogsTool::new(services.logs)),
        ];

        let mut registry = Self::new();
        for handler in handlers {
            // Every handler above carries a builtin name.
            let _ = registry.register(handler);
        }
        registry
    }

    /// Register a handler under the builtin its name designates. Returns
    /// the handler it replaced, if any.
    pub fn register(&mut self, handler: Arc<dyn Tool>) -> Result<Option<Arc<dyn Tool>>, ToolError> {
        let tool: BuiltinTool = handler.name().parse()?;
        Ok(self.handlers.insert(tool, handler))
    }

    /// Resolve a model-supplied tool name to its handler.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn Tool>, ToolError> {
        let tool: BuiltinTool = name.parse()?;
        self.handlers
            .get(&tool)
            .ok_or_else(|| ToolError::Unsupported(name.to_string()))
    }

    /// Definitions for every registered handler, in builtin order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.values().map(|h| h.to_definition()).collect()
    }

    pub fn tools(&self) -> impl Iterator<Item = BuiltinTool> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
