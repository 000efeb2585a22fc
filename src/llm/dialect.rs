// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Wire dialect selection
//!
//! A backend speaks one of two JSON/SSE shapes. The dialect is chosen
//! once per request from provider configuration; everything downstream
//! branches on the enum, never on response shape.

use serde_json::{json, Value};

use crate::chat::message::{Message, Role, TokenUsage};
use crate::error::{ApiError, NovaError, Result};

/// Protocol version header required by Anthropic-style endpoints
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The wire dialect of a provider endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Anthropic messages API (`/v1/messages`, `x-api-key` auth)
    Anthropic,
    /// OpenAI-style chat completions (`/v1/chat/completions`, bearer auth)
    OpenAiCompatible,
}

impl Dialect {
    /// Detect the dialect from provider configuration
    ///
    /// Anthropic-compatible gateways are recognized by their base URL
    /// (`api.anthropic.com` or a `/anthropic` path segment) or a
    /// `claude-` model id; everything else is treated as an
    /// OpenAI-style endpoint.
    pub fn detect(base_url: &str, model: &str) -> Self {
        if base_url.contains("api.anthropic.com")
            || base_url.contains("/anthropic")
            || model.starts_with("claude-")
        {
            Dialect::Anthropic
        } else {
            Dialect::OpenAiCompatible
        }
    }

    /// Full endpoint URL for this dialect
    pub fn endpoint(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Dialect::Anthropic => format!("{}/v1/messages", base),
            Dialect::OpenAiCompatible => format!("{}/v1/chat/completions", base),
        }
    }

    /// Request headers for this dialect
    pub fn headers(&self, api_key: &str) -> Vec<(String, String)> {
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        match self {
            Dialect::Anthropic => {
                headers.push(("x-api-key".to_string(), api_key.to_string()));
                headers.push((
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                ));
            }
            Dialect::OpenAiCompatible => {
                headers.push((
                    "authorization".to_string(),
                    format!("Bearer {}", api_key),
                ));
            }
        }
        headers
    }

    /// Build the request body for one turn
    pub fn request_body(
        &self,
        model: &str,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
        stream: bool,
    ) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": model,
            "messages": wire_messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": stream,
        })
    }

    /// Parse a complete (non-streaming) response body
    pub fn parse_buffered(&self, body: &Value) -> Result<BufferedCompletion> {
        match self {
            Dialect::Anthropic => {
                let text = body["content"]
                    .as_array()
                    .and_then(|blocks| {
                        blocks
                            .iter()
                            .find(|b| b["type"].as_str() == Some("text"))
                            .and_then(|b| b["text"].as_str())
                    })
                    .unwrap_or_default()
                    .to_string();

                let mut usage = TokenUsage::default();
                usage.apply_snapshot(
                    body["usage"]["input_tokens"].as_u64(),
                    body["usage"]["output_tokens"].as_u64(),
                );
                Ok(BufferedCompletion { text, usage })
            }
            Dialect::OpenAiCompatible => {
                let choice = body["choices"].get(0).ok_or_else(|| {
                    NovaError::Api(ApiError::InvalidResponse(
                        "no choices in response".to_string(),
                    ))
                })?;
                let text = choice["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();

                let mut usage = TokenUsage::default();
                usage.apply_snapshot(
                    body["usage"]["prompt_tokens"].as_u64(),
                    body["usage"]["completion_tokens"].as_u64(),
                );
                Ok(BufferedCompletion { text, usage })
            }
        }
    }
}

/// A parsed non-streaming completion
#[derive(Debug, Clone)]
pub struct BufferedCompletion {
    pub text: String,
    pub usage: TokenUsage,
}
