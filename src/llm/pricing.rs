// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Advisory cost estimation
//!
//! Converts token usage into an estimated cost from a fixed rate
//! table. The estimate is shown in the UI and never billed; embedders
//! can swap the table per model.

use crate::chat::message::TokenUsage;

/// USD per million tokens, input and output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTable {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        }
    }
}

impl RateTable {
    pub fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    /// Estimated cost of one turn, in USD
    pub fn estimate(&self, usage: &TokenUsage) -> f64 {
        usage.input_tokens as f64 / 1_000_000.0 * self.input_per_mtok
            + usage.output_tokens as f64 / 1_000_000.0 * self.output_per_mtok
    }
}
