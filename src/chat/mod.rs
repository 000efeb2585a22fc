// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat mode: one streamed completion turn per user prompt

pub mod attachments;
pub mod controller;
pub mod message;

pub use attachments::{render_attachment_context, Attachment};
pub use controller::{ChatChunk, ChatController, TurnHandle, TurnOptions};
pub use message::{Message, Role, StreamingTurn, TokenStats, TokenUsage, ToolApproval};
