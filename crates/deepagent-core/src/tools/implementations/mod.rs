//! Tool implementations
//!
//! Workspace tools:
//! - read: Read a file, or its whole edit history
//! - list: List files, optionally by top-level directory
//! - write: Create/overwrite files
//! - edit: Exact substring replacement, or commit-message rewrites
//!
//! Planning and delegation:
//! - todos: Replace the shared TODO list
//! - task: Delegate work to a sub-agent role
//! - search: Document search backed by an external service

pub mod edit;
pub mod list;
pub mod read;
pub mod search;
pub mod task;
pub mod todos;
pub mod write;

pub use edit::{EditFileTool, EditFileWithCommitTool, EDIT_FILE, EDIT_FILE_WITH_COMMIT};
pub use list::{ListFilesTool, LIST_FILES};
pub use read::{ReadFileTool, ReadFileWithHistoryTool, READ_FILE, READ_FILE_WITH_HISTORY};
pub use search::{
    DisabledDocumentSearch, DocumentSearch, DocumentSearchTool, HttpDocumentSearch, DOCUMENT_SEARCH,
};
pub use task::{TaskTool, TASK};
pub use todos::{WriteTodosTool, WRITE_TODOS};
pub use write::{WriteFileTool, WRITE_FILE};

use std::sync::Arc;

use crate::tools::registry::ToolRegistry;

/// Register the always-available workspace and TODO tools
pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register(Arc::new(WriteTodosTool));
    registry.register(Arc::new(ListFilesTool));
    registry.register(Arc::new(ReadFileTool));
    registry.register(Arc::new(ReadFileWithHistoryTool));
    registry.register(Arc::new(WriteFileTool));
    registry.register(Arc::new(EditFileTool));
    registry.register(Arc::new(EditFileWithCommitTool));
}

/// Register the document search tool over `backend`
pub fn register_search_tool(registry: &ToolRegistry, backend: Arc<dyn DocumentSearch>) {
    registry.register(Arc::new(DocumentSearchTool::new(backend)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tool_names() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);
        assert_eq!(
            registry.names(),
            vec![
                EDIT_FILE,
                EDIT_FILE_WITH_COMMIT,
                LIST_FILES,
                READ_FILE,
                READ_FILE_WITH_HISTORY,
                WRITE_FILE,
                WRITE_TODOS,
            ]
        );
    }
}
