// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Host collaborator interfaces
//!
//! Narrow contracts for services the embedding desktop shell provides.
//! The core only decides *whether* to call them, never how they are
//! implemented.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// File access provided by the host shell
#[async_trait]
pub trait FileService: Send + Sync {
    /// Read a file as UTF-8 text
    async fn read_text(&self, path: &Path) -> Result<String>;

    /// Write text content to a file
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
}

/// Direct filesystem implementation
pub struct LocalFileService;

#[async_trait]
impl FileService for LocalFileService {
    async fn read_text(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
