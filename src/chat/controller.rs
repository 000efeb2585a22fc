// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat turn orchestration
//!
//! Owns one conversation turn: issues the transport request, decodes
//! the stream, accumulates text, and emits incremental chunks to the
//! UI channel. Single-shot: a failed turn is finalized with its
//! error and never retried automatically.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::chat::message::{Message, StreamingTurn, TokenUsage};
use crate::config::{resolve_credentials, ConfigService, CredentialOverrides};
use crate::error::NovaError;
use crate::error::Result;
use crate::llm::decoder::{StreamDecoder, StreamFrame};
use crate::llm::dialect::Dialect;
use crate::llm::pricing::RateTable;
use crate::llm::transport::{RawBody, Transport, TransportRequest};

/// One unit of streaming output for the chat UI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    /// The newly streamed text fragment
    pub text: Option<String>,
    /// The full accumulated text so far
    pub full: Option<String>,
    /// Set on the final chunk of a turn
    pub done: bool,
    /// Final usage, present on the done chunk of a completed turn
    pub usage: Option<TokenUsage>,
}

impl ChatChunk {
    fn delta(text: String, full: String) -> Self {
        Self {
            text: Some(text),
            full: Some(full),
            ..Self::default()
        }
    }

    fn done(usage: Option<TokenUsage>) -> Self {
        Self {
            done: true,
            usage,
            ..Self::default()
        }
    }
}

/// Per-turn options
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Credential overrides; missing fields come from the config service
    pub overrides: CredentialOverrides,
    /// Force a dialect instead of detecting it from the credentials
    pub dialect: Option<Dialect>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request a streamed response; buffered otherwise
    pub stream: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            overrides: CredentialOverrides::default(),
            dialect: None,
            max_tokens: 4096,
            temperature: 1.0,
            stream: true,
        }
    }
}

/// Handle to an in-flight turn
pub struct TurnHandle {
    chunks: mpsc::UnboundedReceiver<ChatChunk>,
    cancel: CancellationToken,
    join: JoinHandle<StreamingTurn>,
}

impl TurnHandle {
    /// Receive the next chunk; `None` once the turn task is done sending
    pub async fn recv(&mut self) -> Option<ChatChunk> {
        self.chunks.recv().await
    }

    /// Abort the in-flight request. The partial text is preserved and
    /// the turn finalizes without an error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn to finalize
    pub async fn finish(self) -> StreamingTurn {
        match self.join.await {
            Ok(turn) => turn,
            Err(e) => {
                let mut turn = StreamingTurn::begin();
                turn.finalize_error(format!("turn task failed: {}", e));
                turn
            }
        }
    }
}

/// Drives chat turns against the provider endpoint
pub struct ChatController {
    transport: Arc<dyn Transport>,
    config: Arc<dyn ConfigService>,
    rates: RateTable,
}

impl ChatController {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<dyn ConfigService>) -> Self {
        Self {
            transport,
            config,
            rates: RateTable::default(),
        }
    }

    /// Replace the advisory rate table
    pub fn with_rates(mut self, rates: RateTable) -> Self {
        self.rates = rates;
        self
    }

    /// Start one turn over the given conversation history
    ///
    /// The history must already end with the new user message. Chunks
    /// arrive on the handle as the response streams in.
    pub async fn start_turn(
        &self,
        history: Vec<Message>,
        options: TurnOptions,
    ) -> Result<TurnHandle> {
        let credentials = resolve_credentials(&options.overrides, self.config.as_ref()).await?;
        let dialect = options
            .dialect
            .unwrap_or_else(|| Dialect::detect(&credentials.base_url, &credentials.model));

        let request = TransportRequest {
            endpoint: dialect.endpoint(&credentials.base_url),
            headers: dialect.headers(&credentials.api_key),
            body: dialect.request_body(
                &credentials.model,
                &history,
                options.max_tokens,
                options.temperature,
                options.stream,
            ),
        };

        debug!(model = %credentials.model, dialect = ?dialect, stream = options.stream, "starting chat turn");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let transport = Arc::clone(&self.transport);
        let rates = self.rates;
        let stream_mode = options.stream;

        let join = tokio::spawn(async move {
            run_turn(transport, request, dialect, rates, stream_mode, tx, task_cancel).await
        });

        Ok(TurnHandle {
            chunks: rx,
            cancel,
            join,
        })
    }
}

async fn run_turn(
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    dialect: Dialect,
    rates: RateTable,
    stream_mode: bool,
    chunks: mpsc::UnboundedSender<ChatChunk>,
    cancel: CancellationToken,
) -> StreamingTurn {
    let mut turn = StreamingTurn::begin();
    let mut usage = TokenUsage::default();

    let response = tokio::select! {
        _ = cancel.cancelled() => {
            turn.finalize_cancelled();
            let _ = chunks.send(ChatChunk::done(None));
            return turn;
        }
        response = async {
            if stream_mode {
                transport.send(request).await
            } else {
                transport.send_buffered(request).await
            }
        } => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "chat turn transport failure");
            turn.finalize_error(e.to_string());
            let _ = chunks.send(ChatChunk::done(None));
            return turn;
        }
    };

    match response.body {
        RawBody::Buffered(bytes) => {
            let parsed = serde_json::from_slice::<serde_json::Value>(&bytes)
                .map_err(NovaError::from)
                .and_then(|value| dialect.parse_buffered(&value));
            match parsed {
                Ok(completion) => {
                    turn.push_text(&completion.text);
                    let _ = chunks.send(ChatChunk::delta(completion.text, turn.text.clone()));
                    usage = completion.usage;
                    let cost = rates.estimate(&usage);
                    let _ = chunks.send(ChatChunk::done(Some(usage)));
                    turn.finalize_ok(usage, cost);
                }
                Err(e) => {
                    turn.finalize_error(e.to_string());
                    let _ = chunks.send(ChatChunk::done(None));
                }
            }
        }
        RawBody::Stream(mut byte_stream) => {
            let mut decoder = StreamDecoder::new(dialect);
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("chat turn cancelled");
                        turn.finalize_cancelled();
                        let _ = chunks.send(ChatChunk::done(None));
                        return turn;
                    }
                    item = byte_stream.next() => item,
                };

                match item {
                    None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "chat stream failed");
                        turn.finalize_error(e.to_string());
                        let _ = chunks.send(ChatChunk::done(None));
                        return turn;
                    }
                    Some(Ok(bytes)) => {
                        for frame in decoder.feed(&bytes) {
                            match frame {
                                StreamFrame::TextDelta { text } => {
                                    turn.push_text(&text);
                                    let _ =
                                        chunks.send(ChatChunk::delta(text, turn.text.clone()));
                                }
                                StreamFrame::Usage {
                                    input_tokens,
                                    output_tokens,
                                } => usage.apply_snapshot(input_tokens, output_tokens),
                                StreamFrame::End => {}
                            }
                        }
                        if decoder.is_finished() {
                            break;
                        }
                    }
                }
            }

            let cost = rates.estimate(&usage);
            let _ = chunks.send(ChatChunk::done(Some(usage)));
            turn.finalize_ok(usage, cost);
        }
    }

    turn
}
