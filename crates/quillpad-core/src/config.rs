//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, where the session is persisted, and the
//! last email used to sign in.
//!
//! Configuration is stored at `~/.config/quillpad/config.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::storage::{FileStore, KeyringStore, PersistentStore};
use crate::utils::trim_trailing_slash;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "quillpad";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides every other base URL source
pub const API_URL_ENV: &str = "QUILLPAD_API_URL";

/// Backend origin; `/api` is appended
pub const BACKEND_HOST_ENV: &str = "QUILLPAD_BACKEND_HOST";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Where the token and cached profile live between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keyring
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL for the REST API, taking environment overrides into account.
    pub fn api_base_url(&self) -> String {
        resolve_base_url(
            std::env::var(API_URL_ENV).ok(),
            self.api_base_url.as_deref(),
            std::env::var(BACKEND_HOST_ENV).ok(),
        )
    }

    /// Open the store selected by `token_backend`.
    pub fn open_store(&self) -> Result<Arc<dyn PersistentStore>> {
        Ok(match self.token_backend {
            TokenBackend::File => Arc::new(FileStore::new(self.cache_dir()?)),
            TokenBackend::Keyring => Arc::new(KeyringStore::new()),
        })
    }
}

fn resolve_base_url(
    env_url: Option<String>,
    configured: Option<&str>,
    backend_host: Option<String>,
) -> String {
    let present = |s: &str| !s.trim().is_empty();

    if let Some(url) = env_url.as_deref().filter(|s| present(s)) {
        return trim_trailing_slash(url.trim()).to_string();
    }
    if let Some(url) = configured.filter(|s| present(s)) {
        return trim_trailing_slash(url.trim()).to_string();
    }
    if let Some(host) = backend_host.as_deref().filter(|s| present(s)) {
        return format!("{}/api", trim_trailing_slash(host.trim()));
    }
    DEFAULT_API_BASE_URL.to_string()
}
