//! Built-in tool implementations for cadence.
//!
//! A small set of workspace tools so the loop can run end-to-end:
//! read and list files (read-only, cacheable), write files, and run shell
//! commands. Relative paths resolve against the tool's workspace root.

pub mod list_files;
pub mod read_file;
pub mod shell;
pub mod write_file;

use cadence_core::error::ToolError;
use cadence_core::tool::ToolRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use list_files::ListFilesTool;
pub use read_file::ReadFileTool;
pub use shell::ShellTool;
pub use write_file::WriteFileTool;

/// Create a registry with all built-in tools rooted at `workspace`.
pub fn default_registry(workspace: impl Into<PathBuf>) -> ToolRegistry {
    let root = workspace.into();
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(root.clone())));
    registry.register(Arc::new(ListFilesTool::new(root.clone())));
    registry.register(Arc::new(WriteFileTool::new(root.clone())));
    registry.register(Arc::new(ShellTool::new(root)));
    registry
}

/// Resolve a possibly relative path against the workspace root.
pub(crate) fn resolve(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}

pub(crate) fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}
