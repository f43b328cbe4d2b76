//! Write file tool — create or overwrite a file, creating parent directories.

use async_trait::async_trait;
use cadence_core::error::ToolError;
use cadence_core::tool::{RiskLevel, Tool, ToolCategory};
use std::path::PathBuf;

use crate::{required_str, resolve};

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it and any parent directories if needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;
        let target = resolve(&self.root, path);

        if let Some(parent) = target.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(ToolError::io(e, Some(path)));
        }

        tokio::fs::write(&target, content)
            .await
            .map_err(|e| ToolError::io(e, Some(path)))?;

        Ok(format!("Successfully wrote {} bytes to {path}", content.len()))
    }
}
