// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File attachment context
//!
//! Attached files are inlined into the outgoing user message as
//! `<file_context>` blocks so the model sees their content. Read
//! failures degrade to a placeholder instead of failing the turn.

use std::path::PathBuf;

use crate::host::FileService;

/// A file the user attached to their prompt
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
}

/// Render attachments into a context suffix for the user message
///
/// Returns an empty string when there are no attachments; otherwise a
/// blank-line-separated sequence of `<file_context>` blocks, prefixed
/// with a blank line so it can be appended directly to the prompt.
pub async fn render_attachment_context(
    files: &dyn FileService,
    attachments: &[Attachment],
) -> String {
    if attachments.is_empty() {
        return String::new();
    }

    let mut blocks = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        match files.read_text(&attachment.path).await {
            Ok(content) => blocks.push(format!(
                "<file_context path=\"{}\">\n{}\n</file_context>",
                attachment.path.display(),
                content
            )),
            Err(e) => blocks.push(format!("[failed to read {}: {}]", attachment.name, e)),
        }
    }

    format!("\n\n{}", blocks.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalFileService;

    #[tokio::test]
    async fn test_no_attachments_empty() {
        let context = render_attachment_context(&LocalFileService, &[]).await;
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_attachment_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rs");
        tokio::fs::write(&path, "fn main() {}").await.unwrap();

        let attachments = vec![Attachment {
            name: "main.rs".to_string(),
            path: path.clone(),
        }];
        let context = render_attachment_context(&LocalFileService, &attachments).await;

        assert!(context.starts_with("\n\n<file_context"));
        assert!(context.contains("fn main() {}"));
        assert!(context.contains(&path.display().to_string()));
    }

    #[tokio::test]
    async fn test_unreadable_attachment_placeholder() {
        let attachments = vec![Attachment {
            name: "ghost.txt".to_string(),
            path: PathBuf::from("/nonexistent/ghost.txt"),
        }];
        let context = render_attachment_context(&LocalFileService, &attachments).await;

        assert!(context.contains("[failed to read ghost.txt"));
    }
}
