//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the tracker backend URL, the hub OAuth2 client settings,
//! the credential store choice and the last used username.
//!
//! Configuration is stored at `~/.config/hubauth/config.json` and can be
//! overridden with `HUBAUTH_*` environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "hubauth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Identity server settings for one OAuth2 client.
///
/// Supplied once when a session is built and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server_uri: String,
    pub client_id: String,
    pub client_secret: String,
    /// Space separated scope list, sent as-is in the password grant
    pub scopes: String,
    /// Redirect URL of the authorization-code flow
    pub landing_url: String,
}

impl ServerConfig {
    /// Token endpoint shared by every grant
    pub fn token_url(&self) -> String {
        format!("{}/api/rest/oauth2/token", self.server_uri.trim_end_matches('/'))
    }

    /// Authorization endpoint the user is sent to in the code flow
    pub fn authorize_url(&self) -> String {
        format!("{}/api/rest/oauth2/auth", self.server_uri.trim_end_matches('/'))
    }
}

/// Which persistent store keeps the credential between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl StoreKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StoreKind::File),
            "keyring" => Some(StoreKind::Keyring),
            "memory" => Some(StoreKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Tracker backend used for the "who am I" check
    pub backend_url: String,
    pub auth: ServerConfig,
    pub store: StoreKind,
    pub last_username: Option<String>,
}

impl AppConfig {
    /// Load the config file (or defaults) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load the config file alone, without environment overrides
    pub fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    /// Persist `username` as the default for the next login
    pub fn remember_username(username: &str) -> Result<()> {
        let mut config = Self::load_file()?;
        config.last_username = Some(username.to_string());
        config.save()
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

    /// Overlay `HUBAUTH_*` variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HUBAUTH_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Some(v) = lookup("HUBAUTH_SERVER_URI") {
            self.auth.server_uri = v;
        }
        if let Some(v) = lookup("HUBAUTH_CLIENT_ID") {
            self.auth.client_id = v;
        }
        if let Some(v) = lookup("HUBAUTH_CLIENT_SECRET") {
            self.auth.client_secret = v;
        }
        if let Some(v) = lookup("HUBAUTH_SCOPES") {
            self.auth.scopes = v;
        }
        if let Some(v) = lookup("HUBAUTH_LANDING_URL") {
            self.auth.landing_url = v;
        }
        if let Some(kind) = lookup("HUBAUTH_STORE").as_deref().and_then(StoreKind::parse) {
            self.store = kind;
        }
    }

    /// Reject configs that cannot reach a token endpoint
    pub fn validate(&self) -> Result<()> {
        if self.auth.server_uri.trim().is_empty() {
            anyhow::bail!("Hub server URI is not configured (HUBAUTH_SERVER_URI)");
        }
        if self.backend_url.trim().is_empty() {
            anyhow::bail!("Backend URL is not configured (HUBAUTH_BACKEND_URL)");
        }
        if self.auth.client_id.trim().is_empty() {
            anyhow::bail!("OAuth client id is not configured (HUBAUTH_CLIENT_ID)");
        }
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
}
