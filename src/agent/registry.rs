// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Live agent session registry
//!
//! Enforces at-most-one concurrent agent loop per logical stream id
//! and carries the abort handle for out-of-band stops. An explicitly
//! owned store: construct one per application (or per test) and pass
//! it into the controllers that need it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct SessionEntry {
    cancel: CancellationToken,
    working_dir: PathBuf,
    started_at: DateTime<Utc>,
}

/// Summary of a live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub stream_id: String,
    pub working_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Registry of live agent sessions, keyed by stream id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a stream id for a new session
    ///
    /// Returns the session's cancellation token, or `None` when the
    /// id is already held. The duplicate start must be suppressed,
    /// not queued.
    pub fn acquire(&self, stream_id: &str, working_dir: &Path) -> Option<CancellationToken> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(stream_id) {
            return None;
        }

        let cancel = CancellationToken::new();
        sessions.insert(
            stream_id.to_string(),
            SessionEntry {
                cancel: cancel.clone(),
                working_dir: working_dir.to_path_buf(),
                started_at: Utc::now(),
            },
        );
        info!(stream_id, "agent session registered");
        Some(cancel)
    }

    /// Release a stream id; safe to call when nothing is held
    pub fn release(&self, stream_id: &str) -> bool {
        let removed = self.sessions.lock().remove(stream_id).is_some();
        if removed {
            debug!(stream_id, "agent session released");
        }
        removed
    }

    /// Signal the session's abort handle and release the id
    ///
    /// Returns false when no session holds the id.
    pub fn abort(&self, stream_id: &str) -> bool {
        let entry = self.sessions.lock().remove(stream_id);
        match entry {
            Some(entry) => {
                info!(stream_id, "aborting agent session");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a session currently holds the id
    pub fn contains(&self, stream_id: &str) -> bool {
        self.sessions.lock().contains_key(stream_id)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all live sessions
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .iter()
            .map(|(stream_id, entry)| SessionInfo {
                stream_id: stream_id.clone(),
                working_dir: entry.working_dir.clone(),
                started_at: entry.started_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> PathBuf {
        PathBuf::from("/tmp/project")
    }

    #[test]
    fn test_acquire_fresh_id() {
        let registry = SessionRegistry::new();
        assert!(registry.acquire("s1", &dir()).is_some());
        assert!(registry.contains("s1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_acquire_duplicate_rejected() {
        let registry = SessionRegistry::new();
        let _token = registry.acquire("s1", &dir()).unwrap();

        assert!(registry.acquire("s1", &dir()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release() {
        let registry = SessionRegistry::new();
        registry.acquire("s1", &dir());

        assert!(registry.release("s1"));
        assert!(!registry.contains("s1"));
        // Releasing again is harmless
        assert!(!registry.release("s1"));
    }

    #[test]
    fn test_acquire_after_release() {
        let registry = SessionRegistry::new();
        registry.acquire("s1", &dir());
        registry.release("s1");

        assert!(registry.acquire("s1", &dir()).is_some());
    }

    #[test]
    fn test_abort_signals_token_and_releases() {
        let registry = SessionRegistry::new();
        let token = registry.acquire("s1", &dir()).unwrap();

        assert!(registry.abort("s1"));
        assert!(token.is_cancelled());
        assert!(!registry.contains("s1"));
    }

    #[test]
    fn test_abort_unknown_id() {
        let registry = SessionRegistry::new();
        assert!(!registry.abort("ghost"));
    }

    #[test]
    fn test_independent_sessions() {
        let registry = SessionRegistry::new();
        let token_1 = registry.acquire("s1", &dir()).unwrap();
        let _token_2 = registry.acquire("s2", &dir()).unwrap();

        assert_eq!(registry.len(), 2);
        registry.abort("s2");
        assert!(!token_1.is_cancelled());
        assert!(registry.contains("s1"));
    }

    #[test]
    fn test_list() {
        let registry = SessionRegistry::new();
        registry.acquire("s1", &dir());
        registry.acquire("s2", &dir());

        let mut ids: Vec<String> = registry.list().into_iter().map(|s| s.stream_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
    }
}
