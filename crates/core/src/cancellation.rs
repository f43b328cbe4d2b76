//! Cooperative cancellation for one top-level operation.
//!
//! A token is created once per operation and shared behind an `Arc`.
//! Cancelling is idempotent and wakes every waiter.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::CancelledError;

#[derive(Debug, Default)]
struct CancelState {
    reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
}

/// Shared, idempotent cancel flag with an awaitable wait primitive.
#[derive(Debug)]
pub struct CancellationToken {
    flag: watch::Sender<bool>,
    state: Mutex<CancelState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag,
            state: Mutex::new(CancelState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CancelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request cancellation. Returns `true` only for the call that actually
    /// flipped the flag; later calls keep the first reason and timestamp.
    pub fn cancel(&self, reason: Option<&str>) -> bool {
        let mut state = self.state();
        if *self.flag.borrow() {
            return false;
        }
        state.reason = reason.map(String::from);
        state.cancelled_at = Some(Utc::now());
        self.flag.send_replace(true);
        tracing::debug!(reason = ?state.reason, "Cancellation requested");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    pub fn reason(&self) -> Option<String> {
        self.state().reason.clone()
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.state().cancelled_at
    }

    /// Suspend until cancelled or until `timeout` elapses.
    ///
    /// Returns `true` if cancelled, `false` on timeout.
    pub async fn wait_for_cancellation(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.flag.subscribe();
        let wait = async move { rx.wait_for(|cancelled| *cancelled).await.is_ok() };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }

    pub fn raise_if_cancelled(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError {
                reason: self.reason(),
            })
        } else {
            Ok(())
        }
    }

    /// Return to the active state, clearing reason and timestamp.
    ///
    /// Only call this when no consumer is concurrently observing the token.
    pub fn reset(&self) {
        let mut state = self.state();
        *state = CancelState::default();
        self.flag.send_replace(false);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
