// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent mode: long-running tool-use sessions with human approval

pub mod backend;
pub mod controller;
pub mod events;
pub mod permission;
pub mod registry;

pub use backend::{AgentBackend, AgentLaunchSpec, ClaudeCliBackend};
pub use controller::{AgentController, SessionOutcome};
pub use events::{
    truncate_tool_result, AgentChunk, AgentChunkPayload, AgentEvent, ChunkRouter,
    TOOL_RESULT_LIMIT,
};
pub use permission::{
    PermissionBehavior, PermissionDecision, PermissionGate, PermissionPrompt, PERMISSION_TIMEOUT,
};
pub use registry::{SessionInfo, SessionRegistry};
