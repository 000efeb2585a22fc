// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Nova - dual-mode streaming core for the Nova desktop chat client.
//!
//! This crate is the runtime behind the desktop shell's two modes:
//! - `chat`: single streamed completion turns against a provider API
//! - `agent`: long-running tool-use sessions with a human approval
//!   gate and at-most-one live session per stream
//!
//! Architecture highlights:
//! - `llm`: wire dialects, HTTP transport, incremental stream decoding
//! - `chat`: turn orchestration, message/usage accounting, attachments
//! - `agent`: backend process bridge, permission gate, session registry
//! - `config`/`host`: collaborator contracts the shell provides
//!
//! The shell talks to the core through typed channels: chat turns emit
//! `ChatChunk`s, agent sessions emit stream-tagged `AgentChunk`s and
//! `PermissionPrompt`s, and decisions come back through the gate.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod host;
pub mod llm;

pub use error::{NovaError, Result};
