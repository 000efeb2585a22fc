// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Credential and provider configuration
//!
//! Resolves the API key, base URL, and model used for a turn or agent
//! session. Callers may supply explicit overrides; otherwise the
//! configured [`ConfigService`] is consulted once per turn.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{NovaError, Result};

/// Default API endpoint when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Resolved credentials for one turn or agent session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API key or auth token
    pub api_key: String,
    /// Base URL of the provider endpoint
    pub base_url: String,
    /// Model identifier
    pub model: String,
}

/// Caller-supplied overrides, merged over the configured credentials
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl CredentialOverrides {
    /// True when every field is supplied and no config read is needed
    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() && self.base_url.is_some() && self.model.is_some()
    }

    /// Merge these overrides over a base set of credentials
    pub fn merge_over(&self, base: Credentials) -> Credentials {
        Credentials {
            api_key: self.api_key.clone().unwrap_or(base.api_key),
            base_url: self.base_url.clone().unwrap_or(base.base_url),
            model: self.model.clone().unwrap_or(base.model),
        }
    }

    /// Build credentials from the overrides alone
    ///
    /// Only valid when [`is_complete`](Self::is_complete) holds.
    pub fn into_credentials(self) -> Option<Credentials> {
        Some(Credentials {
            api_key: self.api_key?,
            base_url: self.base_url?,
            model: self.model?,
        })
    }
}

/// Source of configured credentials
#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Read the configured credentials
    async fn credentials(&self) -> Result<Credentials>;
}

/// Shape of the settings file: only the `env` map is consulted
#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// File-backed config service reading `~/.claude/settings.json`
///
/// The desktop shell shares credentials with the local coding-agent
/// CLI, so the same `env` map drives both: `ANTHROPIC_AUTH_TOKEN` or
/// `ANTHROPIC_API_KEY` for the key, `ANTHROPIC_BASE_URL` for the
/// endpoint, and `ANTHROPIC_MODEL` for the model.
pub struct SettingsConfigService {
    settings_path: PathBuf,
}

impl SettingsConfigService {
    /// Create a service reading from the default settings location
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| NovaError::Config("could not determine home directory".to_string()))?;
        Ok(Self {
            settings_path: home.join(".claude").join("settings.json"),
        })
    }

    /// Create a service reading from an explicit settings file
    pub fn with_path(settings_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
        }
    }

    fn credentials_from_env_map(env: &HashMap<String, String>) -> Result<Credentials> {
        let api_key = env
            .get("ANTHROPIC_AUTH_TOKEN")
            .or_else(|| env.get("ANTHROPIC_API_KEY"))
            .cloned()
            .ok_or_else(|| {
                NovaError::Config("no API key found in settings env map".to_string())
            })?;

        let base_url = env
            .get("ANTHROPIC_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = env
            .get("ANTHROPIC_MODEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Credentials {
            api_key,
            base_url,
            model,
        })
    }
}

#[async_trait]
impl ConfigService for SettingsConfigService {
    async fn credentials(&self) -> Result<Credentials> {
        let raw = tokio::fs::read_to_string(&self.settings_path)
            .await
            .map_err(|e| {
                NovaError::Config(format!(
                    "failed to read {}: {}",
                    self.settings_path.display(),
                    e
                ))
            })?;

        let settings: SettingsFile = serde_json::from_str(&raw)
            .map_err(|e| NovaError::Config(format!("invalid settings file: {}", e)))?;

        Self::credentials_from_env_map(&settings.env)
    }
}

/// Fixed-credential config service, useful for tests and embedders
/// that manage configuration themselves
pub struct StaticConfigService {
    credentials: Credentials,
}

impl StaticConfigService {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl ConfigService for StaticConfigService {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// Resolve credentials for a turn: overrides win, otherwise the
/// config service is read once
pub async fn resolve_credentials(
    overrides: &CredentialOverrides,
    config: &dyn ConfigService,
) -> Result<Credentials> {
    if let Some(credentials) = overrides.clone().into_credentials() {
        return Ok(credentials);
    }
    let base = config.credentials().await?;
    Ok(overrides.merge_over(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn creds(key: &str, url: &str, model: &str) -> Credentials {
        Credentials {
            api_key: key.to_string(),
            base_url: url.to_string(),
            model: model.to_string(),
        }
    }

    // ==================== CredentialOverrides tests ====================

    #[test]
    fn test_overrides_default_incomplete() {
        let overrides = CredentialOverrides::default();
        assert!(!overrides.is_complete());
        assert!(overrides.clone().into_credentials().is_none());
    }

    #[test]
    fn test_overrides_complete() {
        let overrides = CredentialOverrides {
            api_key: Some("sk-test".to_string()),
            base_url: Some("https://example.com".to_string()),
            model: Some("test-model".to_string()),
        };
        assert!(overrides.is_complete());

        let credentials = overrides.into_credentials().unwrap();
        assert_eq!(credentials.api_key, "sk-test");
    }

    #[test]
    fn test_overrides_merge_over() {
        let base = creds("base-key", "https://base", "base-model");
        let overrides = CredentialOverrides {
            model: Some("override-model".to_string()),
            ..Default::default()
        };

        let merged = overrides.merge_over(base);
        assert_eq!(merged.api_key, "base-key");
        assert_eq!(merged.base_url, "https://base");
        assert_eq!(merged.model, "override-model");
    }

    // ==================== SettingsConfigService tests ====================

    fn write_settings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_settings_service_reads_env_map() {
        let file = write_settings(
            r#"{"env":{"ANTHROPIC_API_KEY":"sk-file","ANTHROPIC_BASE_URL":"https://gateway.test","ANTHROPIC_MODEL":"m1"}}"#,
        );
        let service = SettingsConfigService::with_path(file.path());

        let credentials = service.credentials().await.unwrap();
        assert_eq!(credentials.api_key, "sk-file");
        assert_eq!(credentials.base_url, "https://gateway.test");
        assert_eq!(credentials.model, "m1");
    }

    #[tokio::test]
    async fn test_settings_service_auth_token_precedence() {
        let file = write_settings(
            r#"{"env":{"ANTHROPIC_AUTH_TOKEN":"tok","ANTHROPIC_API_KEY":"key"}}"#,
        );
        let service = SettingsConfigService::with_path(file.path());

        let credentials = service.credentials().await.unwrap();
        assert_eq!(credentials.api_key, "tok");
    }

    #[tokio::test]
    async fn test_settings_service_defaults() {
        let file = write_settings(r#"{"env":{"ANTHROPIC_API_KEY":"sk"}}"#);
        let service = SettingsConfigService::with_path(file.path());

        let credentials = service.credentials().await.unwrap();
        assert_eq!(credentials.base_url, DEFAULT_BASE_URL);
        assert_eq!(credentials.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_settings_service_missing_key() {
        let file = write_settings(r#"{"env":{}}"#);
        let service = SettingsConfigService::with_path(file.path());

        let err = service.credentials().await.unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[tokio::test]
    async fn test_settings_service_missing_file() {
        let service = SettingsConfigService::with_path("/nonexistent/settings.json");
        assert!(service.credentials().await.is_err());
    }

    #[tokio::test]
    async fn test_settings_service_invalid_json() {
        let file = write_settings("not json");
        let service = SettingsConfigService::with_path(file.path());

        let err = service.credentials().await.unwrap_err();
        assert!(err.to_string().contains("invalid settings file"));
    }

    // ==================== resolve_credentials tests ====================

    #[tokio::test]
    async fn test_resolve_with_complete_overrides_skips_config() {
        // A config service that always fails proves it was not consulted
        struct FailingConfig;

        #[async_trait]
        impl ConfigService for FailingConfig {
            async fn credentials(&self) -> Result<Credentials> {
                Err(NovaError::Config("should not be read".to_string()))
            }
        }

        let overrides = CredentialOverrides {
            api_key: Some("k".to_string()),
            base_url: Some("https://u".to_string()),
            model: Some("m".to_string()),
        };

        let credentials = resolve_credentials(&overrides, &FailingConfig).await.unwrap();
        assert_eq!(credentials.api_key, "k");
    }

    #[tokio::test]
    async fn test_resolve_merges_partial_overrides() {
        let service = StaticConfigService::new(creds("sk", "https://base", "base-model"));
        let overrides = CredentialOverrides {
            model: Some("other".to_string()),
            ..Default::default()
        };

        let credentials = resolve_credentials(&overrides, &service).await.unwrap();
        assert_eq!(credentials.api_key, "sk");
        assert_eq!(credentials.model, "other");
    }
}
