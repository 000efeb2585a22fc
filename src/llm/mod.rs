// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider wire protocol: dialects, transport, decoding, pricing

pub mod decoder;
pub mod dialect;
pub mod pricing;
pub mod transport;

pub use decoder::{frame_stream, StreamDecoder, StreamFrame};
pub use dialect::{BufferedCompletion, Dialect, ANTHROPIC_VERSION};
pub use pricing::RateTable;
pub use transport::{HttpTransport, RawBody, RawResponse, Transport, TransportRequest};
