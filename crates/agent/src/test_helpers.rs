//! Scripted collaborators shared by the agent crate's unit tests.

use async_trait::async_trait;
use cadence_core::error::{ProviderError, ToolError};
use cadence_core::permission::PermissionGate;
use cadence_core::provider::{Provider, ProviderRequest, ProviderResponse, ResponseBlock, Usage};
use cadence_core::tool::{RiskLevel, Tool, ToolCategory};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A provider that replays a script of responses, then either repeats a
/// fixed response or answers with plain text.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    repeat: Option<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_responses(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Answers every request with `response`.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        Ok(self
            .repeat
            .clone()
            .unwrap_or_else(|| ProviderResponse::text("done")))
    }
}

/// A response requesting the given tool calls, with 10 + 5 tokens of usage.
pub fn tool_use_response(calls: &[(&str, &str, serde_json::Value)]) -> ProviderResponse {
    ProviderResponse {
        content: calls
            .iter()
            .map(|(id, name, input)| ResponseBlock::ToolUse {
                id: (*id).to_string(),
                name: (*name).to_string(),
                input: input.clone(),
            })
            .collect(),
        stop_reason: Some("tool_use".into()),
        usage: Some(Usage::new(10, 5)),
    }
}

/// A configurable tool that counts its invocations.
pub struct CountingTool {
    name: String,
    read_only: bool,
    risk: RiskLevel,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &str, read_only: bool) -> Self {
        Self {
            name: name.to_string(),
            read_only,
            risk: if read_only { RiskLevel::Low } else { RiskLevel::Medium },
            delay: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a file-not-found error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn risk(&self) -> RiskLevel {
        self.risk
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            let path = arguments["path"].as_str().unwrap_or("?").to_string();
            return Err(ToolError::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
                Some(&path),
            ));
        }
        Ok(format!("{} output for {}", self.name, arguments))
    }
}

/// A gate that records what it was asked.
pub struct RecordingGate {
    answer: bool,
    seen: Mutex<Vec<(String, RiskLevel)>>,
}

impl RecordingGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<(String, RiskLevel)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PermissionGate for RecordingGate {
    async fn check(&self, tool_name: &str, risk: RiskLevel, _arguments: &serde_json::Value) -> bool {
        self.seen.lock().unwrap().push((tool_name.to_string(), risk));
        self.answer
    }
}
