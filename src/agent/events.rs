// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent session events
//!
//! Two vocabularies: [`AgentEvent`] is what the backend process
//! emits, [`AgentChunk`] is what the UI receives. Chunks carry the
//! `stream_id` of their session so the receiving side can discard
//! stragglers from a stream that was already replaced.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::debug;

use crate::agent::permission::PermissionDecision;

/// Tool results are truncated to this many characters before
/// transmission to bound memory and UI cost
pub const TOOL_RESULT_LIMIT: usize = 3000;

/// An event from the backend agent process
#[derive(Debug)]
pub enum AgentEvent {
    /// Incremental reasoning text
    TextDelta { text: String },
    /// The agent proposed a tool invocation
    ToolUse { tool_name: String },
    /// A tool finished and produced output
    ToolResult { tool_name: String, content: String },
    /// The pre-tool-use hook is suspended awaiting a decision
    PermissionAsk {
        tool_name: String,
        tool_input: HashMap<String, String>,
        respond: oneshot::Sender<PermissionDecision>,
    },
    /// Process-level failure outside the normal result flow
    Fatal { message: String },
    /// Terminal result from the process
    Completed {
        is_error: bool,
        result: Option<String>,
        error: Option<String>,
    },
}

/// UI-facing payload of one streamed chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentChunkPayload {
    Text { text: String },
    ToolRunning { tool_name: String },
    ToolResult { tool_name: String, result: String },
    Error { error: String },
    Done,
}

/// One streamed chunk, tagged with its session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentChunk {
    pub stream_id: String,
    #[serde(flatten)]
    pub payload: AgentChunkPayload,
}

impl AgentChunk {
    pub fn text(stream_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: AgentChunkPayload::Text { text: text.into() },
        }
    }

    pub fn tool_running(stream_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: AgentChunkPayload::ToolRunning {
                tool_name: tool_name.into(),
            },
        }
    }

    /// Build a tool-result chunk, truncating the result text
    pub fn tool_result(
        stream_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: &str,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: AgentChunkPayload::ToolResult {
                tool_name: tool_name.into(),
                result: truncate_tool_result(result),
            },
        }
    }

    pub fn error(stream_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: AgentChunkPayload::Error {
                error: error.into(),
            },
        }
    }

    pub fn done(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: AgentChunkPayload::Done,
        }
    }
}

/// Truncate a tool result to [`TOOL_RESULT_LIMIT`] characters,
/// respecting character boundaries
pub fn truncate_tool_result(result: &str) -> String {
    match result.char_indices().nth(TOOL_RESULT_LIMIT) {
        Some((index, _)) => result[..index].to_string(),
        None => result.to_string(),
    }
}

/// Receiver-side filter that drops chunks from stale streams
///
/// A freshly started session replaces the followed id; chunks from a
/// previously aborted session whose process has not fully unwound are
/// discarded here, not only at the sender.
#[derive(Debug, Default)]
pub struct ChunkRouter {
    current: Option<String>,
}

impl ChunkRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow a new stream; chunks from any other id are discarded
    pub fn follow(&mut self, stream_id: impl Into<String>) {
        self.current = Some(stream_id.into());
    }

    /// Stop following any stream
    pub fn release(&mut self) {
        self.current = None;
    }

    /// Accept a chunk if it belongs to the followed stream
    pub fn accept(&self, chunk: AgentChunk) -> Option<AgentChunkPayload> {
        match &self.current {
            Some(current) if *current == chunk.stream_id => Some(chunk.payload),
            _ => {
                debug!(stream_id = %chunk.stream_id, "discarding chunk from stale stream");
                None
            }
        }
    }
}
