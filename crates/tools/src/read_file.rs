//! Read file tool — return a file's contents.

use async_trait::async_trait;
use cadence_core::error::ToolError;
use cadence_core::tool::{RiskLevel, Tool, ToolCategory};
use std::path::PathBuf;

use crate::{required_str, resolve};

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
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
        let path = required_str(&arguments, "path")?;
        tokio::fs::read_to_string(resolve(&self.root, path))
            .await
            .map_err(|e| ToolError::io(e, Some(path)))
    }
}
