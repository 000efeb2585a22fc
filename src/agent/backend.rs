// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent process backend
//!
//! Launches the external reasoning process and translates its wire
//! protocol into [`AgentEvent`]s. The concrete backend spawns the
//! `claude` CLI speaking newline-delimited JSON on stdio; permission
//! interception happens through the CLI's control protocol: a
//! `can_use_tool` request on stdout suspends the tool until the
//! matching response is written to stdin.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::agent::events::AgentEvent;
use crate::agent::permission::PermissionDecision;
use crate::chat::message::Message;
use crate::config::ConfigService;
use crate::error::{NovaError, Result};

/// Everything needed to launch one agent session
#[derive(Debug, Clone)]
pub struct AgentLaunchSpec {
    /// The user's new prompt (last message of the conversation)
    pub prompt: String,
    /// Prior conversation history, for backends that replay it
    pub history: Vec<Message>,
    /// Project directory the agent operates in
    pub working_dir: PathBuf,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Extra environment for the process
    pub env: HashMap<String, String>,
    pub max_turns: u32,
}

impl AgentLaunchSpec {
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
            working_dir: working_dir.into(),
            model: None,
            system_prompt: None,
            env: HashMap::new(),
            max_turns: 20,
        }
    }
}

/// Launches agent processes and exposes their event stream
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Start the process; events arrive on the returned channel until
    /// the process terminates
    async fn launch(&self, spec: AgentLaunchSpec) -> Result<mpsc::Receiver<AgentEvent>>;
}

/// Backend spawning the local `claude` CLI
pub struct ClaudeCliBackend {
    executable: PathBuf,
    config: Arc<dyn ConfigService>,
}

impl ClaudeCliBackend {
    pub fn new(config: Arc<dyn ConfigService>) -> Self {
        Self {
            executable: PathBuf::from("claude"),
            config,
        }
    }

    /// Use an explicit CLI path instead of resolving from `PATH`
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }
}

#[async_trait]
impl AgentBackend for ClaudeCliBackend {
    async fn launch(&self, spec: AgentLaunchSpec) -> Result<mpsc::Receiver<AgentEvent>> {
        let credentials = self.config.credentials().await?;

        let mut command = Command::new(&self.executable);
        command.args([
            "--print",
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
            "--include-partial-messages",
            // The CLI's own interactive prompt cannot run inside the
            // desktop shell; approval happens in our hook instead.
            "--permission-mode",
            "bypassPermissions",
        ]);
        command.arg("--max-turns").arg(spec.max_turns.to_string());
        if let Some(model) = &spec.model {
            command.arg("--model").arg(model);
        }
        if let Some(system_prompt) = &spec.system_prompt {
            command.arg("--append-system-prompt").arg(system_prompt);
        }

        command.current_dir(&spec.working_dir);
        command.env("ANTHROPIC_API_KEY", &credentials.api_key);
        command.env("ANTHROPIC_BASE_URL", &credentials.base_url);
        // A plain prompt avoids hangs from user shell prompt hooks
        command.env("PROMPT", "$ ");
        command.env("PS1", "$ ");
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(cwd = %spec.working_dir.display(), "launching agent process");

        let mut child = command
            .spawn()
            .map_err(|e| NovaError::Agent(format!("failed to launch agent process: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| NovaError::Agent("agent process has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| NovaError::Agent("agent process has no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let prompt = spec.prompt;

        tokio::spawn(async move {
            let initial = json!({
                "type": "user",
                "message": { "role": "user", "content": prompt },
            });
            let mut line = initial.to_string();
            line.push('\n');
            if stdin.write_all(line.as_bytes()).await.is_err() {
                let _ = tx
                    .send(AgentEvent::Fatal {
                        message: "agent process closed stdin".to_string(),
                    })
                    .await;
                return;
            }

            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(raw)) => {
                        for wire_event in parse_wire_line(&raw) {
                            let event = match wire_event {
                                WireEvent::Control {
                                    request_id,
                                    tool_name,
                                    tool_input,
                                } => {
                                    let (decision_tx, decision_rx) = oneshot::channel();
                                    if tx
                                        .send(AgentEvent::PermissionAsk {
                                            tool_name,
                                            tool_input,
                                            respond: decision_tx,
                                        })
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                    // The tool stays suspended in the
                                    // process until this response lands
                                    let decision = decision_rx.await.unwrap_or_else(|_| {
                                        PermissionDecision::deny("session closed")
                                    });
                                    let response = control_response(&request_id, &decision);
                                    if stdin.write_all(response.as_bytes()).await.is_err() {
                                        warn!("failed to answer agent control request");
                                        return;
                                    }
                                    continue;
                                }
                                WireEvent::Text(text) => AgentEvent::TextDelta { text },
                                WireEvent::ToolUse(tool_name) => AgentEvent::ToolUse { tool_name },
                                WireEvent::ToolResult { tool_name, content } => {
                                    AgentEvent::ToolResult { tool_name, content }
                                }
                                WireEvent::Completed {
                                    is_error,
                                    result,
                                    error,
                                } => AgentEvent::Completed {
                                    is_error,
                                    result,
                                    error,
                                },
                                WireEvent::Fatal(message) => AgentEvent::Fatal { message },
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx
                            .send(AgentEvent::Fatal {
                                message: format!("agent stdout read failed: {}", e),
                            })
                            .await;
                        break;
                    }
                }
            }

            let _ = child.wait().await;
        });

        Ok(rx)
    }
}

/// Data-only view of one stdout line
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WireEvent {
    Text(String),
    ToolUse(String),
    ToolResult {
        tool_name: String,
        content: String,
    },
    Control {
        request_id: String,
        tool_name: String,
        tool_input: HashMap<String, String>,
    },
    Completed {
        is_error: bool,
        result: Option<String>,
        error: Option<String>,
    },
    Fatal(String),
}

/// Parse one NDJSON stdout line into wire events
///
/// Unknown message types and malformed lines are skipped.
pub(crate) fn parse_wire_line(line: &str) -> Vec<WireEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let Ok(value) = serde_json::from_str::<Value>(line) else {
        trace!("skipping malformed agent output line");
        return Vec::new();
    };

    match value["type"].as_str() {
        Some("stream_event") => {
            let event = &value["event"];
            if event["type"].as_str() == Some("content_block_delta")
                && event["delta"]["type"].as_str() == Some("text_delta")
            {
                if let Some(text) = event["delta"]["text"].as_str() {
                    return vec![WireEvent::Text(text.to_string())];
                }
            }
            Vec::new()
        }
        Some("assistant") => value["message"]["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block["type"].as_str() == Some("tool_use"))
                    .filter_map(|block| block["name"].as_str())
                    .map(|name| WireEvent::ToolUse(name.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        Some("tool_result") => {
            let tool_name = value["tool_name"]
                .as_str()
                .or_else(|| value["toolName"].as_str())
                .unwrap_or_default()
                .to_string();
            let content = match value["content"].as_str() {
                Some(text) => text.to_string(),
                None => value["content"].to_string(),
            };
            vec![WireEvent::ToolResult { tool_name, content }]
        }
        Some("control_request") => {
            let request = &value["request"];
            if request["subtype"].as_str() != Some("can_use_tool") {
                return Vec::new();
            }
            let Some(request_id) = value["request_id"].as_str() else {
                return Vec::new();
            };
            let tool_input = request["input"]
                .as_object()
                .map(|input| {
                    input
                        .iter()
                        .map(|(key, val)| {
                            let rendered = match val.as_str() {
                                Some(s) => s.to_string(),
                                None => val.to_string(),
                            };
                            (key.clone(), rendered)
                        })
                        .collect()
                })
                .unwrap_or_default();
            vec![WireEvent::Control {
                request_id: request_id.to_string(),
                tool_name: request["tool_name"].as_str().unwrap_or_default().to_string(),
                tool_input,
            }]
        }
        Some("result") => {
            let is_error = value["is_error"].as_bool().unwrap_or(false);
            let result = value["result"].as_str().map(str::to_string);
            let error = value["error"]["message"]
                .as_str()
                .map(str::to_string)
                .or_else(|| if is_error { result.clone() } else { None });
            vec![WireEvent::Completed {
                is_error,
                result,
                error,
            }]
        }
        Some("error") => {
            let message = value["error"]["message"]
                .as_str()
                .unwrap_or("unknown agent error")
                .to_string();
            vec![WireEvent::Fatal(message)]
        }
        _ => Vec::new(),
    }
}

/// Serialize the control response line for a permission decision
pub(crate) fn control_response(request_id: &str, decision: &PermissionDecision) -> String {
    let response = if decision.is_allowed() {
        json!({ "behavior": "allow" })
    } else {
        json!({
            "behavior": "deny",
            "message": decision.message.as_deref().unwrap_or("denied by reviewer"),
        })
    };

    let mut line = json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        },
    })
    .to_string();
    line.push('\n');
    line
}
