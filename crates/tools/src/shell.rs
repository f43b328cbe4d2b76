//! Shell tool — execute system commands.
//!
//! Supports command allowlisting, workspace scoping, and timeout.

use async_trait::async_trait;
use cadence_core::error::ToolError;
use cadence_core::tool::{RiskLevel, Tool, ToolCategory};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Execute shell commands inside the workspace root.
pub struct ShellTool {
    root: PathBuf,
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed_commands: Vec::new(),
        }
    }

    pub fn with_allowed_commands(mut self, allowed: Vec<String>) -> Self {
        self.allowed_commands = allowed;
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("");
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 60)"
                }
            },
            "required": ["command"]
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout_secs = arguments["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, timeout_secs, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.root).kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(result) => result.map_err(|e| ToolError::io(e, None))?,
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "shell".into(),
                    timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            let text = if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            return Ok(text.trim().to_string());
        }

        let code = output.status.code().unwrap_or(-1);
        warn!(command = %command, exit_code = code, "Command failed");
        Err(ToolError::ExecutionFailed {
            tool_name: "shell".into(),
            reason: format!("[exit code: {code}]\n{stdout}\n{stderr}").trim().to_string(),
        })
    }
}
