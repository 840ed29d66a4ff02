//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Environment variable that overrides `server.base_url`.
pub const API_URL_ENV: &str = "AUDIO_API_URL";

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the processing service lives.
    pub server: ServerCfg,
    /// Status polling behaviour.
    pub polling: PollingCfg,
}

/// Remote service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCfg {
    /// Base URL, without the `/audio/...` suffix.
    pub base_url: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

/// Poll loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingCfg {
    /// Delay between two status queries.
    pub interval_ms: u64,
    /// Consecutive failed status queries tolerated before the job is failed.
    /// Zero means the first failure is fatal.
    #[serde(default)]
    pub max_poll_retries: u32,
}

impl PollingCfg {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ServerCfg {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Replace the base URL when an override is given (flag or env).
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.server.base_url = url;
        }
        self
    }
}

impl Default for Config {
    /// Defaults match a service running locally with its stock settings.
    fn default() -> Self {
        Self {
            server: ServerCfg {
                base_url: "http://localhost:8000".into(),
                connect_timeout_secs: 10,
            },
            polling: PollingCfg {
                interval_ms: 1000,
                max_poll_retries: 0,
            },
        }
    }
}
