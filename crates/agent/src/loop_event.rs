//! Events emitted by the conversation loop.
//!
//! Every event carries the iteration it was produced in and the running token
//! total. A run always ends with exactly one `finished` event.

use cadence_core::error::LlmErrorKind;
use cadence_core::provider::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvent {
    #[serde(flatten)]
    pub kind: LoopEventKind,
    pub iteration: u32,
    pub total_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

impl LoopEvent {
    pub fn new(kind: LoopEventKind, iteration: u32, total_tokens: u64) -> Self {
        Self {
            kind,
            iteration,
            total_tokens,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, LoopEventKind::Finished { .. })
    }
}

/// Kind-specific payload of a [`LoopEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEventKind {
    /// Model text.
    Text { content: String },

    /// The model requested a tool.
    ToolCall {
        tool_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A tool call produced a result (possibly an error result).
    ToolResult {
        tool_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
        cached: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retryable: Option<bool>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        suggestions: Vec<String>,
    },

    /// The permission gate refused a tool call.
    PermissionDenied {
        tool_id: String,
        tool_name: String,
        content: String,
    },

    /// The next tool result was served from cache.
    CacheHit { tool_id: String, tool_name: String },

    IterationLimitReached { max_iterations: u32 },

    TokenLimitReached { max_tokens: u64 },

    LlmError {
        error_type: LlmErrorKind,
        error_message: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancel_reason: Option<String>,
    },

    /// Always the last event of a run. `usage` is cumulative.
    Finished { usage: Usage },
}

impl LoopEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::CacheHit { .. } => "cache_hit",
            Self::IterationLimitReached { .. } => "iteration_limit_reached",
            Self::TokenLimitReached { .. } => "token_limit_reached",
            Self::LlmError { .. } => "llm_error",
            Self::Cancelled { .. } => "cancelled",
            Self::Finished { .. } => "finished",
        }
    }
}
