//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, where the session record is stored, and
//! the session manager tunables.
//!
//! Configuration is stored at `~/.config/ledgerdesk/config.json`. A handful
//! of `LEDGERDESK_*` environment variables override the file.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::activity::RefreshRule;

/// Application name used for config/data/cache directory paths
const APP_NAME: &str = "ledgerdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Secret used to stretch the storage key when none is configured
const DEFAULT_STORAGE_SECRET: &str = "ledgerdesk-user-data";

/// What to do when the auth check cannot reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the user signed in from the stored record.
    #[default]
    BestEffortRestore,
    /// Treat an unreachable server like an expired session.
    StrictClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" | "keychain" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

/// Session manager tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for auth check and login requests
    pub request_timeout_ms: u64,
    /// Storage slot holding the encoded user record
    pub storage_key: String,
    pub post_login_path: String,
    pub landing_path: String,
    /// Redirect to the caller's return URL after login instead of
    /// `post_login_path`
    pub honor_return_url: bool,
    pub failure_policy: FailurePolicy,
    pub refresh_rule: RefreshRule,
    /// How long session-expiry notifications stay visible
    pub notification_duration_ms: u64,
    /// Login errors whose text contains this marker are not shown to the user
    pub suppressed_error_marker: String,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        self.refresh_rule
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid session config: {}", e))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 25_000,
            storage_key: "userData".into(),
            post_login_path: "/mycourses/list".into(),
            landing_path: "/home".into(),
            honor_return_url: false,
            failure_policy: FailurePolicy::default(),
            refresh_rule: RefreshRule::default(),
            notification_duration_ms: 10_000,
            suppressed_error_marker: "compcode".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub storage: StorageBackend,
    pub storage_secret: Option<String>,
    pub last_username: Option<String>,
    pub log_file: Option<PathBuf>,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            storage: StorageBackend::default(),
            storage_secret: None,
            last_username: None,
            log_file: None,
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env()?;
        config.session.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `LEDGERDESK_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("LEDGERDESK_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(storage) = var("LEDGERDESK_STORAGE").filter(|v| !v.is_empty()) {
            self.storage = storage.parse()?;
        }
        if let Some(secret) = var("LEDGERDESK_STORAGE_SECRET").filter(|v| !v.is_empty()) {
            self.storage_secret = Some(secret);
        }
        Ok(())
    }

    pub fn storage_secret(&self) -> &str {
        self.storage_secret.as_deref().unwrap_or(DEFAULT_STORAGE_SECRET)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file-backed session store
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
