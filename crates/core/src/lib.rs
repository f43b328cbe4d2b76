//! # Cadence Core
//!
//! Domain types, traits, and error definitions for the cadence coding-assistant
//! agent loop. Every seam the loop talks through (LLM backend, tools,
//! permission gate) is a trait here; implementations live in their own crates.

pub mod cancellation;
pub mod error;
pub mod message;
pub mod permission;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cancellation::CancellationToken;
pub use error::{
    CancelledError, Error, Failure, LlmError, LlmErrorKind, ProviderError, Result, ToolError,
};
pub use message::{ContentBlock, Message, Role, Session, SessionId, ToolInvocation};
pub use permission::{PermissionGate, StaticGate};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, ResponseBlock, ToolSchema, Usage, WireMessage,
    WireToolCall,
};
pub use tool::{RiskLevel, Tool, ToolCall, ToolCategory, ToolRegistry};
