// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the conversion/history backend.
    pub api_base_url: String,

    /// Base URL of the identity service.
    pub identity_base_url: String,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Timeout for a single credential refresh call in milliseconds.
    /// A timed-out refresh is treated as a terminal refresh failure.
    pub refresh_timeout_ms: u64,

    /// Directory for the persisted credential file. `None` resolves via
    /// `NOTIFAI_STATE_DIR` / `XDG_STATE_HOME` / `HOME`.
    pub state_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            identity_base_url: String::new(),
            request_timeout_ms: 10_000,
            refresh_timeout_ms: 30_000,
            state_dir: None,
        }
    }
}

impl ClientConfig {
    /// Build a config from environment variables.
    ///
    /// `NOTIFAI_API_BASE_URL` and `NOTIFAI_IDENTITY_BASE_URL` are required;
    /// bare hosts are prefixed with `https://`.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_base_url = require_env("NOTIFAI_API_BASE_URL")?;
        let identity_base_url = std::env::var("NOTIFAI_IDENTITY_BASE_URL")
            .unwrap_or_else(|_| api_base_url.clone());

        let mut config = Self {
            api_base_url: ensure_scheme(&api_base_url),
            identity_base_url: ensure_scheme(&identity_base_url),
            ..Self::default()
        };
        if let Ok(ms) = std::env::var("NOTIFAI_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms.parse()?;
        }
        if let Ok(ms) = std::env::var("NOTIFAI_REFRESH_TIMEOUT_MS") {
            config.refresh_timeout_ms = ms.parse()?;
        }
        if let Ok(dir) = std::env::var("NOTIFAI_STATE_DIR") {
            config.state_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Resolve the directory holding the persisted credential file.
    ///
    /// Checks the explicit `state_dir`, then `NOTIFAI_STATE_DIR`, then
    /// `$XDG_STATE_HOME/notifai`, then `$HOME/.local/state/notifai`.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("NOTIFAI_STATE_DIR") {
            return PathBuf::from(dir);
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("notifai");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/notifai");
        }
        PathBuf::from(".notifai")
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} environment variable not set"))
}

/// Prefix bare hosts with `https://`, leaving explicit schemes alone.
fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_owned()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_https_scheme() {
        assert_eq!(ensure_scheme("api.example.com"), "https://api.example.com");
        assert_eq!(ensure_scheme("http://localhost:8080"), "http://localhost:8080");
        assert_eq!(ensure_scheme("https://api.example.com"), "https://api.example.com");
    }

    #[test]
    fn default_timeouts() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn explicit_state_dir_wins() {
        let config = ClientConfig {
            state_dir: Some(PathBuf::from("/tmp/creds")),
            ..ClientConfig::default()
        };
        assert_eq!(config.resolved_state_dir(), PathBuf::from("/tmp/creds"));
    }
}
