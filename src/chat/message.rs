// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation data model
//!
//! Messages, token accounting, and the in-flight streaming turn.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Tri-state approval badge attached to a tool call inside a rendered
/// message. A projection for the UI only; the authoritative decision
/// lives in the permission gate while the request is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolApproval {
    Pending,
    Approved,
    Rejected,
}

/// One message in a conversation
///
/// Immutable once appended, except the in-progress assistant message
/// which grows through streaming appends until finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tool_approvals: HashMap<String, ToolApproval>,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            tool_approvals: HashMap::new(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            tool_approvals: HashMap::new(),
        }
    }

    /// Record the approval state for a tool call rendered in this message
    pub fn set_tool_approval(&mut self, tool_id: impl Into<String>, approval: ToolApproval) {
        self.tool_approvals.insert(tool_id.into(), approval);
    }
}

/// Token usage for one turn
///
/// Wire counters arrive as cumulative snapshots: present fields
/// overwrite, absent fields keep their last value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Apply a usage snapshot from the wire
    pub fn apply_snapshot(&mut self, input_tokens: Option<u64>, output_tokens: Option<u64>) {
        if let Some(input) = input_tokens {
            self.input_tokens = input;
        }
        if let Some(output) = output_tokens {
            self.output_tokens = output;
        }
    }

    /// True when no counter has been reported yet
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// Running totals across a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
}

impl TokenStats {
    /// Fold one finished turn into the running totals
    pub fn record_turn(&mut self, usage: &TokenUsage, cost: f64) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.total_cost += cost;
    }
}

/// The live assistant message under construction
///
/// Transitions from `is_streaming = true` to `false` exactly once:
/// normal completion, error, or cancellation.
#[derive(Debug, Clone, Default)]
pub struct StreamingTurn {
    /// Accumulated assistant text
    pub text: String,
    /// Whether the turn is still receiving deltas
    pub is_streaming: bool,
    /// Final usage, set on normal completion
    pub usage: Option<TokenUsage>,
    /// Advisory cost estimate, set on normal completion
    pub cost: Option<f64>,
    /// Failure message; never set by cancellation
    pub error: Option<String>,
}

impl StreamingTurn {
    /// Begin a new streaming turn
    pub fn begin() -> Self {
        Self {
            is_streaming: true,
            ..Self::default()
        }
    }

    /// Append streamed text
    pub fn push_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Finalize after normal completion
    pub fn finalize_ok(&mut self, usage: TokenUsage, cost: f64) {
        self.is_streaming = false;
        self.usage = Some(usage);
        self.cost = Some(cost);
    }

    /// Finalize after a failure
    pub fn finalize_error(&mut self, message: impl Into<String>) {
        self.is_streaming = false;
        self.error = Some(message.into());
    }

    /// Finalize after a user cancel: partial text is kept, no error
    pub fn finalize_cancelled(&mut self) {
        self.is_streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Message tests ====================

    #[test]
    fn test_message_user_creation() {
        let message = Message::user("Hello, world!");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "Hello, world!");
        assert!(message.tool_approvals.is_empty());
    }

    #[test]
    fn test_message_assistant_creation() {
        let message = Message::assistant("I can help with that.");
        assert_eq!(message.role, Role::Assistant);
    }

    #[test]
    fn test_message_tool_approval() {
        let mut message = Message::assistant("running a tool");
        message.set_tool_approval("tool-1", ToolApproval::Pending);
        message.set_tool_approval("tool-1", ToolApproval::Approved);

        assert_eq!(
            message.tool_approvals.get("tool-1"),
            Some(&ToolApproval::Approved)
        );
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    // ==================== TokenUsage tests ====================

    #[test]
    fn test_usage_snapshot_overwrites() {
        let mut usage = TokenUsage::default();
        usage.apply_snapshot(Some(100), None);
        usage.apply_snapshot(None, Some(5));
        usage.apply_snapshot(None, Some(42));

        // Output is the latest snapshot, not a sum
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 42);
    }

    #[test]
    fn test_usage_is_empty() {
        let mut usage = TokenUsage::default();
        assert!(usage.is_empty());
        usage.apply_snapshot(Some(1), None);
        assert!(!usage.is_empty());
    }

    // ==================== TokenStats tests ====================

    #[test]
    fn test_stats_record_turn_sums() {
        let mut stats = TokenStats::default();
        stats.record_turn(
            &TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            0.5,
        );
        stats.record_turn(
            &TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            0.25,
        );

        assert_eq!(stats.input_tokens, 110);
        assert_eq!(stats.output_tokens, 55);
        assert!((stats.total_cost - 0.75).abs() < f64::EPSILON);
    }

    // ==================== StreamingTurn tests ====================

    #[test]
    fn test_turn_begin() {
        let turn = StreamingTurn::begin();
        assert!(turn.is_streaming);
        assert!(turn.text.is_empty());
        assert!(turn.error.is_none());
    }

    #[test]
    fn test_turn_finalize_ok() {
        let mut turn = StreamingTurn::begin();
        turn.push_text("Hello ");
        turn.push_text("world");
        turn.finalize_ok(
            TokenUsage {
                input_tokens: 3,
                output_tokens: 2,
            },
            0.01,
        );

        assert!(!turn.is_streaming);
        assert_eq!(turn.text, "Hello world");
        assert_eq!(turn.usage.unwrap().output_tokens, 2);
        assert!(turn.error.is_none());
    }

    #[test]
    fn test_turn_finalize_error() {
        let mut turn = StreamingTurn::begin();
        turn.finalize_error("boom");

        assert!(!turn.is_streaming);
        assert_eq!(turn.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_turn_finalize_cancelled_keeps_text_no_error() {
        let mut turn = StreamingTurn::begin();
        turn.push_text("partial");
        turn.finalize_cancelled();

        assert!(!turn.is_streaming);
        assert_eq!(turn.text, "partial");
        assert!(turn.error.is_none());
    }
}
