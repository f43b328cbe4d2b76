//! Security policy for cadence tool calls.
//!
//! Provides:
//! - **Risk tiers**: pure auto-approval rule per [`RiskLevel`](cadence_core::RiskLevel)
//! - **Permission manager**: session-owned override flag plus an async prompt seam

pub mod permission;

pub use permission::{auto_approves, FixedPrompt, PermissionManager, PermissionPrompt};
