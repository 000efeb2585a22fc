// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent session orchestration
//!
//! Drives one agent loop: claims the stream id, launches the backend
//! process, maps its events into UI chunks, routes tool proposals
//! through the permission gate, and tears the session down on
//! completion, failure, or abort. The registry entry is released on
//! every terminal path, including panics, via a drop guard.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::backend::{AgentBackend, AgentLaunchSpec};
use crate::agent::events::{AgentChunk, AgentEvent};
use crate::agent::permission::{PermissionGate, PermissionPrompt};
use crate::agent::registry::SessionRegistry;

/// How an agent session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The process finished successfully
    Completed,
    /// The process failed or an internal error occurred
    Failed { error: String },
    /// The session was stopped by the user
    Aborted,
    /// A session with this stream id was already running; nothing started
    AlreadyRunning,
}

/// Orchestrates agent sessions against a backend
pub struct AgentController {
    backend: Arc<dyn AgentBackend>,
    gate: Arc<PermissionGate>,
    registry: Arc<SessionRegistry>,
}

impl AgentController {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        gate: Arc<PermissionGate>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            backend,
            gate,
            registry,
        }
    }

    /// The permission gate, for delivering reviewer decisions
    pub fn gate(&self) -> Arc<PermissionGate> {
        Arc::clone(&self.gate)
    }

    /// The session registry, for inspection
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Stop a running session; false when none holds the id
    pub fn stop(&self, stream_id: &str) -> bool {
        self.registry.abort(stream_id)
    }

    /// Run one agent session to a terminal state
    ///
    /// Chunks are delivered to `chunks` in process emission order,
    /// tagged with `stream_id`. Permission prompts go to `prompts`;
    /// decisions come back through the gate.
    pub async fn run(
        &self,
        stream_id: &str,
        spec: AgentLaunchSpec,
        chunks: mpsc::UnboundedSender<AgentChunk>,
        prompts: mpsc::UnboundedSender<PermissionPrompt>,
    ) -> SessionOutcome {
        let Some(cancel) = self.registry.acquire(stream_id, &spec.working_dir) else {
            warn!(stream_id, "agent session already running, ignoring duplicate");
            return SessionOutcome::AlreadyRunning;
        };

        let _release = ReleaseGuard {
            registry: Arc::clone(&self.registry),
            stream_id: stream_id.to_string(),
        };

        let outcome = self
            .drive(stream_id, spec, &cancel, &chunks, &prompts)
            .await;
        info!(stream_id, outcome = ?outcome, "agent session finished");
        outcome
    }

    async fn drive(
        &self,
        stream_id: &str,
        spec: AgentLaunchSpec,
        cancel: &CancellationToken,
        chunks: &mpsc::UnboundedSender<AgentChunk>,
        prompts: &mpsc::UnboundedSender<PermissionPrompt>,
    ) -> SessionOutcome {
        let mut events = match self.backend.launch(spec).await {
            Ok(events) => events,
            Err(e) => {
                let error = e.to_string();
                let _ = chunks.send(AgentChunk::error(stream_id, &error));
                return SessionOutcome::Failed { error };
            }
        };

        let mut streamed_text = false;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = chunks.send(AgentChunk::done(stream_id));
                    return SessionOutcome::Aborted;
                }
                event = events.recv() => event,
            };

            match event {
                None => {
                    // Process ended without a terminal result message
                    let _ = chunks.send(AgentChunk::done(stream_id));
                    return SessionOutcome::Completed;
                }
                Some(AgentEvent::TextDelta { text }) => {
                    streamed_text = true;
                    let _ = chunks.send(AgentChunk::text(stream_id, text));
                }
                Some(AgentEvent::ToolUse { tool_name }) => {
                    let _ = chunks.send(AgentChunk::tool_running(stream_id, tool_name));
                }
                Some(AgentEvent::ToolResult { tool_name, content }) => {
                    let _ = chunks.send(AgentChunk::tool_result(stream_id, tool_name, &content));
                }
                Some(AgentEvent::PermissionAsk {
                    tool_name,
                    tool_input,
                    respond,
                }) => {
                    // The hook is suspended until a decision lands; the
                    // wait itself stays responsive to an abort
                    let decision = tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = chunks.send(AgentChunk::done(stream_id));
                            return SessionOutcome::Aborted;
                        }
                        decision = self.gate.request_approval(&tool_name, tool_input, prompts) => decision,
                    };
                    let _ = respond.send(decision);
                }
                Some(AgentEvent::Fatal { message }) => {
                    if cancel.is_cancelled() || is_cancellation_message(&message) {
                        let _ = chunks.send(AgentChunk::done(stream_id));
                        return SessionOutcome::Aborted;
                    }
                    let _ = chunks.send(AgentChunk::error(stream_id, &message));
                    return SessionOutcome::Failed { error: message };
                }
                Some(AgentEvent::Completed {
                    is_error,
                    result,
                    error,
                }) => {
                    if is_error {
                        let error =
                            error.unwrap_or_else(|| "agent run failed".to_string());
                        let _ = chunks.send(AgentChunk::error(stream_id, &error));
                        return SessionOutcome::Failed { error };
                    }
                    // Non-incremental backends only report a final
                    // result string; surface it as one text chunk
                    if !streamed_text {
                        if let Some(result) = result.filter(|r| !r.is_empty()) {
                            let _ = chunks.send(AgentChunk::text(stream_id, result));
                        }
                    }
                    let _ = chunks.send(AgentChunk::done(stream_id));
                    return SessionOutcome::Completed;
                }
            }
        }
    }
}

/// Abort signals often surface as process-level cancellation errors
fn is_cancellation_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("abort") || lower.contains("cancel")
}

/// Releases the registry entry on every exit path
struct ReleaseGuard {
    registry: Arc<SessionRegistry>,
    stream_id: String,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.registry.release(&self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancellation_message() {
        assert!(is_cancellation_message("The operation was aborted"));
        assert!(is_cancellation_message("request cancelled"));
        assert!(!is_cancellation_message("connection refused"));
    }

    #[test]
    fn test_release_guard_releases_on_drop() {
        let registry = Arc::new(SessionRegistry::new());
        registry.acquire("s1", std::path::Path::new("/tmp"));

        {
            let _guard = ReleaseGuard {
                registry: Arc::clone(&registry),
                stream_id: "s1".to_string(),
            };
        }

        assert!(!registry.contains("s1"));
    }

    #[test]
    fn test_outcome_equality() {
        assert_eq!(SessionOutcome::Completed, SessionOutcome::Completed);
        assert_ne!(SessionOutcome::Completed, SessionOutcome::Aborted);
    }
}
