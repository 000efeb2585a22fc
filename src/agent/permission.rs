// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Human approval gate for tool invocations
//!
//! Correlates outstanding approval requests with pending decisions.
//! Each request is keyed by a fresh `request_id`, never by stream or
//! tool name, so two calls to the same tool get two distinct
//! requests. Exactly one resolution wins: an external
//! [`resolve`](PermissionGate::resolve) call or the timeout auto-deny;
//! anything after that is a logged no-op.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

/// How long a request may stay pending before it is auto-denied
pub const PERMISSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The reviewer's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    Allow,
    Deny,
}

/// A resolved decision, with an optional reason surfaced to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub behavior: PermissionBehavior,
    pub message: Option<String>,
}

impl PermissionDecision {
    pub fn allow() -> Self {
        Self {
            behavior: PermissionBehavior::Allow,
            message: None,
        }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            behavior: PermissionBehavior::Deny,
            message: Some(message.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.behavior == PermissionBehavior::Allow
    }
}

/// An approval request surfaced to the UI
#[derive(Debug, Clone, Serialize)]
pub struct PermissionPrompt {
    pub request_id: String,
    pub tool_name: String,
    pub tool_input: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// The pending-request table
///
/// An explicitly owned store: construct one per application (or per
/// test) and pass it into the controllers that need it.
pub struct PermissionGate {
    pending: Mutex<HashMap<String, oneshot::Sender<PermissionDecision>>>,
    timeout: Duration,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::with_timeout(PERMISSION_TIMEOUT)
    }

    /// Override the auto-deny window (tests use short timeouts)
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Number of requests currently awaiting a decision
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Ask the reviewer for a decision, suspending until one arrives
    ///
    /// Emits a [`PermissionPrompt`] on the UI channel and waits for
    /// the matching [`resolve`](Self::resolve) call or the timeout,
    /// whichever comes first. Dropping the returned future (session
    /// abort) removes the pending entry; a resolution arriving after
    /// that is a harmless no-op.
    pub async fn request_approval(
        &self,
        tool_name: &str,
        tool_input: HashMap<String, String>,
        prompts: &mpsc::UnboundedSender<PermissionPrompt>,
    ) -> PermissionDecision {
        let request_id = format!("perm-{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let prompt = PermissionPrompt {
            request_id: request_id.clone(),
            tool_name: tool_name.to_string(),
            tool_input,
            created_at: Utc::now(),
        };

        if prompts.send(prompt).is_err() {
            self.pending.lock().remove(&request_id);
            warn!(tool_name, "no permission listener, denying");
            return PermissionDecision::deny("permission prompt could not be delivered");
        }

        debug!(%request_id, tool_name, "permission request pending");

        let _cleanup = PendingGuard {
            gate: self,
            request_id: &request_id,
        };

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => PermissionDecision::deny("permission channel closed"),
            Err(_) => {
                warn!(%request_id, tool_name, "permission request timed out");
                PermissionDecision::deny("permission request timed out")
            }
        }
    }

    /// Deliver the reviewer's decision for a pending request
    ///
    /// Returns false when no request with that id is pending (already
    /// resolved, timed out, or abandoned). A logged no-op, not an
    /// error.
    pub fn resolve(&self, request_id: &str, decision: PermissionDecision) -> bool {
        let sender = self.pending.lock().remove(request_id);
        match sender {
            Some(tx) => {
                if tx.send(decision).is_err() {
                    debug!(%request_id, "permission wait already abandoned");
                }
                true
            }
            None => {
                warn!(%request_id, "no pending permission request");
                false
            }
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the pending entry when the wait ends by any path
struct PendingGuard<'a> {
    gate: &'a PermissionGate,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.gate.pending.lock().remove(self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt_channel() -> (
        mpsc::UnboundedSender<PermissionPrompt>,
        mpsc::UnboundedReceiver<PermissionPrompt>,
    ) {
        mpsc::unbounded_channel()
    }

    // ==================== decision tests ====================

    #[test]
    fn test_decision_allow() {
        let decision = PermissionDecision::allow();
        assert!(decision.is_allowed());
        assert!(decision.message.is_none());
    }

    #[test]
    fn test_decision_deny_with_message() {
        let decision = PermissionDecision::deny("no");
        assert!(!decision.is_allowed());
        assert_eq!(decision.message.as_deref(), Some("no"));
    }

    // ==================== gate tests ====================

    #[tokio::test]
    async fn test_approval_resolved_allow() {
        let gate = PermissionGate::new();
        let (tx, mut rx) = prompt_channel();

        let wait = gate.request_approval("shell", HashMap::new(), &tx);
        tokio::pin!(wait);

        // Drive the wait until the prompt is emitted
        let prompt = tokio::select! {
            _ = &mut wait => panic!("resolved before prompt handled"),
            prompt = rx.recv() => prompt.unwrap(),
        };
        assert!(prompt.request_id.starts_with("perm-"));
        assert_eq!(prompt.tool_name, "shell");
        assert_eq!(gate.pending_len(), 1);

        assert!(gate.resolve(&prompt.request_id, PermissionDecision::allow()));

        let decision = wait.await;
        assert!(decision.is_allowed());
        assert_eq!(gate.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_approval_times_out_to_deny() {
        let gate = PermissionGate::with_timeout(Duration::from_millis(20));
        let (tx, mut rx) = prompt_channel();

        let decision = gate.request_approval("shell", HashMap::new(), &tx).await;

        assert!(!decision.is_allowed());
        assert!(decision.message.unwrap().contains("timed out"));
        assert_eq!(gate.pending_len(), 0);

        // A late resolution is a no-op
        let prompt = rx.recv().await.unwrap();
        assert!(!gate.resolve(&prompt.request_id, PermissionDecision::allow()));
    }

    #[tokio::test]
    async fn test_resolve_unknown_request_is_noop() {
        let gate = PermissionGate::new();
        assert!(!gate.resolve("perm-missing", PermissionDecision::allow()));
    }

    #[tokio::test]
    async fn test_double_resolution_second_is_noop() {
        let gate = PermissionGate::new();
        let (tx, mut rx) = prompt_channel();

        let wait = gate.request_approval("shell", HashMap::new(), &tx);
        tokio::pin!(wait);

        let prompt = tokio::select! {
            _ = &mut wait => panic!("resolved before prompt handled"),
            prompt = rx.recv() => prompt.unwrap(),
        };

        assert!(gate.resolve(&prompt.request_id, PermissionDecision::deny("first")));
        assert!(!gate.resolve(&prompt.request_id, PermissionDecision::allow()));

        let decision = wait.await;
        assert_eq!(decision.message.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_no_listener_denies_immediately() {
        let gate = PermissionGate::new();
        let (tx, rx) = prompt_channel();
        drop(rx);

        let decision = gate.request_approval("shell", HashMap::new(), &tx).await;
        assert!(!decision.is_allowed());
        assert_eq!(gate.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_wait_cleans_pending_entry() {
        let gate = PermissionGate::new();
        let (tx, mut rx) = prompt_channel();

        {
            let wait = gate.request_approval("shell", HashMap::new(), &tx);
            tokio::pin!(wait);
            let _prompt = tokio::select! {
                _ = &mut wait => panic!("resolved before prompt handled"),
                prompt = rx.recv() => prompt.unwrap(),
            };
            assert_eq!(gate.pending_len(), 1);
            // Dropping the wait simulates a session abort mid-request
        }

        assert_eq!(gate.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_same_tool_gets_distinct_request_ids() {
        let gate = std::sync::Arc::new(PermissionGate::new());
        let (tx, mut rx) = prompt_channel();

        let gate_a = gate.clone();
        let tx_a = tx.clone();
        let wait_a =
            tokio::spawn(async move { gate_a.request_approval("shell", HashMap::new(), &tx_a).await });
        let gate_b = gate.clone();
        let tx_b = tx.clone();
        let wait_b =
            tokio::spawn(async move { gate_b.request_approval("shell", HashMap::new(), &tx_b).await });

        let prompt_1 = rx.recv().await.unwrap();
        let prompt_2 = rx.recv().await.unwrap();
        assert_ne!(prompt_1.request_id, prompt_2.request_id);

        gate.resolve(&prompt_1.request_id, PermissionDecision::allow());
        gate.resolve(&prompt_2.request_id, PermissionDecision::deny("no"));

        let decision_a = wait_a.await.unwrap();
        let decision_b = wait_b.await.unwrap();
        // One allow and one deny were delivered, independently
        assert_ne!(decision_a.is_allowed(), decision_b.is_allowed());
    }
}
