//! PermissionGate trait — asks whether a tool call may proceed.

use async_trait::async_trait;
use crate::tool::RiskLevel;

/// Decides whether a tool call is allowed. May suspend (e.g. to prompt a user).
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(&self, tool_name: &str, risk: RiskLevel, arguments: &serde_json::Value) -> bool;
}

/// A gate that answers every call the same way.
#[derive(Debug, Clone, Copy)]
pub struct StaticGate(pub bool);

impl StaticGate {
    pub fn allow_all() -> Self {
        Self(true)
    }

    pub fn deny_all() -> Self {
        Self(false)
    }
}

#[async_trait]
impl PermissionGate for StaticGate {
    async fn check(&self, _tool_name: &str, _risk: RiskLevel, _arguments: &serde_json::Value) -> bool {
        self.0
    }
}
