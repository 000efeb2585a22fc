// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP transport for provider requests
//!
//! One request per turn. The [`Transport`] trait abstracts how bytes
//! leave the process: the default implementation streams the response
//! body, and `send_buffered` routes the same request through a
//! buffered channel for hosts where a streaming fetch is unavailable.
//! Routing never changes the normalized frames downstream.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use crate::error::{ApiError, NovaError, Result};

/// A fully assembled provider request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// Response body: streamed or buffered, depending on the channel
pub enum RawBody {
    /// Byte chunks as they arrive off the wire
    Stream(Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>),
    /// The complete body, already read
    Buffered(Vec<u8>),
}

impl std::fmt::Debug for RawBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawBody::Stream(_) => f.write_str("RawBody::Stream(..)"),
            RawBody::Buffered(bytes) => write!(f, "RawBody::Buffered({} bytes)", bytes.len()),
        }
    }
}

/// A successful provider response
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: RawBody,
}

/// How bytes leave the process
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request, streaming the response body
    async fn send(&self, request: TransportRequest) -> Result<RawResponse>;

    /// Issue the request over the buffered channel
    async fn send_buffered(&self, request: TransportRequest) -> Result<RawResponse>;
}

/// Direct HTTP transport over reqwest
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn issue(&self, request: &TransportRequest) -> Result<reqwest::Response> {
        let mut builder = self.client.post(&request.endpoint);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        debug!(endpoint = %request.endpoint, "sending provider request");

        let response = builder
            .json(&request.body)
            .send()
            .await
            .map_err(|e| NovaError::Api(ApiError::Network(e.to_string())))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NovaError::Api(parse_error_body(status, &body)));
        }

        Ok(response)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let response = self.issue(&request).await?;
        let status = response.status().as_u16();

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| NovaError::Api(ApiError::StreamError(e.to_string())))
        });

        Ok(RawResponse {
            status,
            body: RawBody::Stream(Box::pin(stream)),
        })
    }

    async fn send_buffered(&self, request: TransportRequest) -> Result<RawResponse> {
        let response = self.issue(&request).await?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NovaError::Api(ApiError::StreamError(e.to_string())))?;

        Ok(RawResponse {
            status,
            body: RawBody::Buffered(bytes.to_vec()),
        })
    }
}

/// Map a non-2xx response body to a typed error
///
/// Prefers the structured `{"error":{"message"}}` shape, then a bare
/// `{"message"}`, then the raw body.
pub fn parse_error_body(status: u16, body: &str) -> ApiError {
    if status == 401 {
        return ApiError::AuthenticationFailed;
    }

    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                format!("API request failed: {}", status)
            } else {
                body.to_string()
            }
        });

    ApiError::ServerError { status, message }
}
