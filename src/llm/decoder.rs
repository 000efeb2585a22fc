// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Incremental stream decoding
//!
//! Consumes raw byte chunks (arriving at arbitrary boundaries, not
//! aligned to logical frames) and yields normalized frames regardless
//! of wire dialect. A carry-over buffer holds the last, possibly
//! incomplete line between chunks; a single malformed frame is
//! skipped, never fatal.

use futures::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::llm::dialect::Dialect;

/// Terminal sentinel payload that ends the stream early
const DONE_SENTINEL: &str = "[DONE]";

/// A normalized streaming frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Incremental assistant text
    TextDelta { text: String },
    /// Usage snapshot; present fields overwrite previous values
    Usage {
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    },
    /// End of stream
    End,
}

/// Incremental decoder for one response stream
#[derive(Debug)]
pub struct StreamDecoder {
    dialect: Dialect,
    buffer: Vec<u8>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// True once the terminal sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one byte chunk, returning every frame completed by it
    ///
    /// The byte split points never affect the emitted frame sequence:
    /// only complete newline-terminated lines are interpreted, and the
    /// trailing partial line is carried into the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.finished {
                continue;
            }

            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };

            let data = data.trim();
            if data == DONE_SENTINEL {
                self.finished = true;
                frames.push(StreamFrame::End);
                continue;
            }
            // Some gateways pad the stream with literal null frames
            if data == "null" {
                continue;
            }

            match serde_json::from_str::<Value>(data) {
                Ok(value) => self.map_frame(&value, &mut frames),
                Err(e) => trace!(error = %e, "skipping malformed stream frame"),
            }
        }
        frames
    }

    fn map_frame(&self, value: &Value, frames: &mut Vec<StreamFrame>) {
        match self.dialect {
            Dialect::Anthropic => match value["type"].as_str() {
                Some("content_block_delta") => {
                    if let Some(text) = value["delta"]["text"].as_str() {
                        frames.push(StreamFrame::TextDelta {
                            text: text.to_string(),
                        });
                    }
                }
                Some("message_delta") => {
                    let usage = &value["usage"];
                    let input_tokens = usage["input_tokens"].as_u64();
                    let output_tokens = usage["output_tokens"].as_u64();
                    if input_tokens.is_some() || output_tokens.is_some() {
                        frames.push(StreamFrame::Usage {
                            input_tokens,
                            output_tokens,
                        });
                    }
                }
                Some("message_start") => {
                    let usage = &value["message"]["usage"];
                    let input_tokens = usage["input_tokens"].as_u64();
                    let output_tokens = usage["output_tokens"].as_u64();
                    if input_tokens.is_some() || output_tokens.is_some() {
                        frames.push(StreamFrame::Usage {
                            input_tokens,
                            output_tokens,
                        });
                    }
                }
                _ => {}
            },
            Dialect::OpenAiCompatible => {
                if let Some(choice) = value["choices"].get(0) {
                    let content = choice["delta"]["content"]
                        .as_str()
                        .or_else(|| choice["message"]["content"].as_str());
                    if let Some(text) = content {
                        if !text.is_empty() {
                            frames.push(StreamFrame::TextDelta {
                                text: text.to_string(),
                            });
                        }
                    }
                }
                // Usage typically arrives only in a final non-delta frame
                if value["usage"].is_object() {
                    let usage = &value["usage"];
                    let input_tokens = usage["prompt_tokens"].as_u64();
                    let output_tokens = usage["completion_tokens"].as_u64();
                    if input_tokens.is_some() || output_tokens.is_some() {
                        frames.push(StreamFrame::Usage {
                            input_tokens,
                            output_tokens,
                        });
                    }
                }
            }
        }
    }
}

/// Wrap a byte stream into a lazy stream of normalized frames
pub fn frame_stream<S>(
    dialect: Dialect,
    bytes: S,
) -> impl Stream<Item = Result<StreamFrame>> + Send
where
    S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut decoder = StreamDecoder::new(dialect);
        futures_util::pin_mut!(bytes);
        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for frame in decoder.feed(&chunk) {
                let end = matches!(frame, StreamFrame::End);
                yield frame;
                if end {
                    break 'outer;
                }
            }
        }
    }
}
