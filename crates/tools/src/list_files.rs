//! List files tool — directory listing, directories suffixed with `/`.

use async_trait::async_trait;
use cadence_core::error::ToolError;
use cadence_core::tool::{RiskLevel, Tool, ToolCategory};
use std::path::PathBuf;

use crate::resolve;

pub struct ListFilesTool {
    root: PathBuf,
}

impl ListFilesTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (defaults to the workspace root)"
                }
            }
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let path = arguments["path"].as_str().unwrap_or(".");
        let dir = resolve(&self.root, path);

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::io(e, Some(path)))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::io(e, Some(path)))?
        {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        if entries.is_empty() {
            return Ok(format!("{path} is empty"));
        }
        Ok(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let tool = ListFilesTool::new(dir.path());
        let output = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(output, "a.txt\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListFilesTool::new(dir.path());
        let output = tool.execute(serde_json::json!({"path": "."})).await.unwrap();
        assert_eq!(output, ". is empty");
    }

    #[tokio::test]
    async fn listing_a_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plain.txt"), "x").unwrap();
        let tool = ListFilesTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "plain.txt"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotADirectory");
    }
}
