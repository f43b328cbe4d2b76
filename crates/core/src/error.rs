//! Error types for the cadence domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Tool failures additionally
//! expose a stable *kind* and *lineage* so they can be classified, and LLM
//! backend failures are classified by [`LlmError::classify`].

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use thiserror::Error;

/// The top-level error type for all cadence operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Cancellation ---
    #[error(transparent)]
    Cancelled(#[from] CancelledError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

/// A failure raised by a tool body.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Io {
        kind: ErrorKind,
        path: Option<String>,
        message: String,
    },

    #[error("git: {0}")]
    Git(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid JSON: {0}")]
    Decode(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

impl ToolError {
    /// Wrap an I/O error, keeping its kind and the path it concerned.
    pub fn io(err: std::io::Error, path: Option<&str>) -> Self {
        let message = match path {
            Some(p) => format!("{p}: {err}"),
            None => err.to_string(),
        };
        Self::Io {
            kind: err.kind(),
            path: path.map(String::from),
            message,
        }
    }

    /// The concrete failure kind, used for exact-kind classification.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ToolNotFound",
            Self::Io { kind, .. } => io_kind_name(*kind),
            Self::Git(_) => "GitError",
            Self::Timeout { .. } => "Timeout",
            Self::Network(_) => "ConnectionError",
            Self::InvalidArguments(_) => "InvalidArgument",
            Self::Decode(_) => "DecodeError",
            Self::Syntax(_) => "SyntaxError",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
        }
    }

    /// Ancestor kinds, most specific first. A failure "is a" each of these.
    pub fn lineage(&self) -> &'static [&'static str] {
        match self {
            Self::Io { kind, .. } => io_lineage(*kind),
            _ => &[],
        }
    }
}

fn io_kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "FileNotFound",
        ErrorKind::PermissionDenied => "PermissionDenied",
        ErrorKind::IsADirectory => "IsADirectory",
        ErrorKind::NotADirectory => "NotADirectory",
        ErrorKind::AlreadyExists => "FileExists",
        ErrorKind::TimedOut => "TimedOut",
        ErrorKind::ConnectionRefused => "ConnectionRefused",
        ErrorKind::ConnectionReset => "ConnectionReset",
        ErrorKind::ConnectionAborted => "ConnectionAborted",
        ErrorKind::InvalidInput => "InvalidInput",
        ErrorKind::InvalidData => "InvalidData",
        _ => "Io",
    }
}

fn io_lineage(kind: ErrorKind) -> &'static [&'static str] {
    match kind {
        ErrorKind::TimedOut => &["Timeout", "Io"],
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            &["ConnectionError", "Io"]
        }
        ErrorKind::InvalidInput => &["InvalidArgument", "Io"],
        ErrorKind::InvalidData => &["DecodeError", "Io"],
        _ => &["Io"],
    }
}

/// A classifiable description of a failure: its kind, the kinds it
/// specializes, and its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<String>,
    pub message: String,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            lineage: Vec::new(),
            message: message.into(),
        }
    }

    /// Declare the ancestor kinds this failure specializes.
    pub fn with_lineage<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lineage = ancestors.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this failure is of `kind`, directly or through its lineage.
    pub fn is_a(&self, kind: &str) -> bool {
        self.kind == kind || self.lineage.iter().any(|k| k == kind)
    }
}

impl From<&ToolError> for Failure {
    fn from(err: &ToolError) -> Self {
        Failure::new(err.kind(), err.to_string()).with_lineage(err.lineage().iter().copied())
    }
}

/// Raised by [`crate::CancellationToken::raise_if_cancelled`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", cancelled_message(.reason))]
pub struct CancelledError {
    pub reason: Option<String>,
}

fn cancelled_message(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!("Operation cancelled: {r}"),
        None => "Operation cancelled".into(),
    }
}

// --- LLM backend failure classification ---

/// Category of an LLM backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    RateLimit,
    Network,
    Authentication,
    InvalidRequest,
    ServiceUnavailable,
    Generic,
}

impl LlmErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::InvalidRequest => "invalid_request",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Generic => "llm_error",
        }
    }

    /// Transient categories are worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::ServiceUnavailable
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const RATE_LIMIT_KEYWORDS: &[&str] = &["rate limit", "rate_limit", "too many requests", "429"];
const NETWORK_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "socket",
    "dns",
    "refused",
];
const AUTH_KEYWORDS: &[&str] = &[
    "authentication",
    "unauthorized",
    "invalid api key",
    "401",
    "403",
];
const SERVICE_KEYWORDS: &[&str] = &[
    "service unavailable",
    "internal server error",
    "500",
    "502",
    "503",
    "504",
];

/// A classified LLM backend failure. The original error is kept as `source`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retryable: bool,
    pub status_code: Option<u16>,
    #[source]
    pub source: ProviderError,
}

impl LlmError {
    /// Classify a backend failure.
    ///
    /// Typed variants are honoured first; otherwise the message is matched
    /// case-insensitively against keyword lists in this order: rate limit,
    /// network, authentication, service unavailable. `InvalidRequest` is only
    /// reachable through a typed 400.
    pub fn classify(error: ProviderError) -> Self {
        let message = error.to_string();
        let (kind, status_code) = match typed_kind(&error) {
            Some(typed) => typed,
            None => (keyword_kind(&message), None),
        };
        Self {
            kind,
            retryable: kind.is_retryable(),
            message,
            status_code,
            source: error,
        }
    }
}

fn typed_kind(error: &ProviderError) -> Option<(LlmErrorKind, Option<u16>)> {
    match error {
        ProviderError::RateLimited { .. } => Some((LlmErrorKind::RateLimit, Some(429))),
        ProviderError::AuthenticationFailed(_) => Some((LlmErrorKind::Authentication, Some(401))),
        ProviderError::Timeout(_) | ProviderError::Network(_) => Some((LlmErrorKind::Network, None)),
        ProviderError::ApiError { status_code, .. } => {
            let kind = match status_code {
                429 => LlmErrorKind::RateLimit,
                401 | 403 => LlmErrorKind::Authentication,
                400 => LlmErrorKind::InvalidRequest,
                500 | 502 | 503 | 504 => LlmErrorKind::ServiceUnavailable,
                _ => return None,
            };
            Some((kind, Some(*status_code)))
        }
        _ => None,
    }
}

fn keyword_kind(message: &str) -> LlmErrorKind {
    let lower = message.to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if hit(RATE_LIMIT_KEYWORDS) {
        LlmErrorKind::RateLimit
    } else if hit(NETWORK_KEYWORDS) {
        LlmErrorKind::Network
    } else if hit(AUTH_KEYWORDS) {
        LlmErrorKind::Authentication
    } else if hit(SERVICE_KEYWORDS) {
        LlmErrorKind::ServiceUnavailable
    } else {
        LlmErrorKind::Generic
    }
}
