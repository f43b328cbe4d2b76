//! Risk-tier permission policy.
//!
//! LOW-risk tools are always auto-approved. MEDIUM-risk tools are
//! auto-approved only while the session override is on. Everything else goes
//! to the prompt; with no prompt attached the call is denied.

use async_trait::async_trait;
use cadence_core::permission::PermissionGate;
use cadence_core::tool::RiskLevel;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Pure auto-approval rule for a risk tier.
pub fn auto_approves(risk: RiskLevel, session_override: bool) -> bool {
    match risk {
        RiskLevel::Low => true,
        RiskLevel::Medium => session_override,
        RiskLevel::High => false,
    }
}

/// Asks a human (or a stand-in) to confirm a tool call.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn confirm(&self, tool_name: &str, risk: RiskLevel, arguments: &serde_json::Value) -> bool;
}

/// A prompt that always gives the same answer (`--yes`, tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub bool);

#[async_trait]
impl PermissionPrompt for FixedPrompt {
    async fn confirm(&self, _tool_name: &str, _risk: RiskLevel, _arguments: &serde_json::Value) -> bool {
        self.0
    }
}

/// The session's permission gate: tier policy plus an optional prompt.
pub struct PermissionManager {
    session_override: AtomicBool,
    prompt: Option<Arc<dyn PermissionPrompt>>,
}

impl PermissionManager {
    pub fn new(session_override: bool) -> Self {
        Self {
            session_override: AtomicBool::new(session_override),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn PermissionPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn session_override(&self) -> bool {
        self.session_override.load(Ordering::Relaxed)
    }

    pub fn set_session_override(&self, enabled: bool) {
        self.session_override.store(enabled, Ordering::Relaxed);
        debug!(enabled, "Session permission override changed");
    }
}

impl Default for PermissionManager {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl PermissionGate for PermissionManager {
    async fn check(&self, tool_name: &str, risk: RiskLevel, arguments: &serde_json::Value) -> bool {
        if auto_approves(risk, self.session_override()) {
            debug!(tool = tool_name, %risk, "Auto-approved");
            return true;
        }

        let approved = match &self.prompt {
            Some(prompt) => prompt.confirm(tool_name, risk, arguments).await,
            None => false,
        };

        if !approved {
            warn!(tool = tool_name, %risk, "Tool call denied");
        }
        approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingPrompt {
        answer: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PermissionPrompt for CountingPrompt {
        async fn confirm(&self, _tool_name: &str, _risk: RiskLevel, _arguments: &serde_json::Value) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn tier_policy() {
        assert!(auto_approves(RiskLevel::Low, false));
        assert!(auto_approves(RiskLevel::Low, true));
        assert!(!auto_approves(RiskLevel::Medium, false));
        assert!(auto_approves(RiskLevel::Medium, true));
        assert!(!auto_approves(RiskLevel::High, true));
    }

    #[tokio::test]
    async fn low_risk_never_prompts() {
        let prompt = Arc::new(CountingPrompt { answer: false, calls: AtomicUsize::new(0) });
        let gate = PermissionManager::new(false).with_prompt(prompt.clone());
        assert!(gate.check("read_file", RiskLevel::Low, &serde_json::json!({})).await);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn override_skips_prompt_for_medium_only() {
        let prompt = Arc::new(CountingPrompt { answer: false, calls: AtomicUsize::new(0) });
        let gate = PermissionManager::new(false).with_prompt(prompt.clone());
        let args = serde_json::json!({"path": "x"});

        assert!(!gate.check("write_file", RiskLevel::Medium, &args).await);
        gate.set_session_override(true);
        assert!(gate.check("write_file", RiskLevel::Medium, &args).await);
        assert!(!gate.check("shell", RiskLevel::High, &args).await);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_prompt_denies_high_risk() {
        let gate = PermissionManager::default();
        assert!(!gate.check("shell", RiskLevel::High, &serde_json::json!({})).await);
    }

    #[tokio::test]
    async fn fixed_prompt_approves() {
        let gate = PermissionManager::default().with_prompt(Arc::new(FixedPrompt(true)));
        assert!(gate.check("shell", RiskLevel::High, &serde_json::json!({})).await);
    }
}
