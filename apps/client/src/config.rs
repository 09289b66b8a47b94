//! Client configuration management.
//!
//! Configuration is stored as TOML. The path is the first command-line
//! argument, or `~/.config/pulselink/client.toml` when none is given. A
//! missing file is created with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pulselink_client::{ClientConfig, ReconnectConfig};
use pulselink_protocol::Framing;
use pulselink_protocol::constants::{DEFAULT_PORT, DEFAULT_WRITE_IDLE, MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Identity sent with every message. Must be unique per client.
    #[serde(default = "default_client_id")]
    pub client_id: u64,

    /// Seconds of outbound silence before a ping is sent (0 disables).
    #[serde(default = "default_write_idle_secs")]
    pub write_idle_secs: u64,

    #[serde(default)]
    pub framing: Framing,

    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// Backoff settings for the reconnect loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_client_id() -> u64 {
    1
}

fn default_write_idle_secs() -> u64 {
    DEFAULT_WRITE_IDLE.as_secs()
}

fn default_max_frame_len() -> usize {
    MAX_FRAME_LEN
}

fn default_initial_delay_ms() -> u64 {
    ReconnectConfig::default().initial_delay.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    ReconnectConfig::default().max_delay.as_millis() as u64
}

fn default_backoff_factor() -> f64 {
    ReconnectConfig::default().backoff_factor
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            write_idle_secs: default_write_idle_secs(),
            framing: Framing::default(),
            max_frame_len: default_max_frame_len(),
            reconnect: ReconnectSection::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path,
            None => config_path(),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            write_idle: Duration::from_secs(self.write_idle_secs),
            framing: self.framing,
            max_frame_len: self.max_frame_len,
            ..ClientConfig::new(self.host.clone(), self.port, self.client_id)
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            backoff_factor: self.reconnect.backoff_factor.max(1.0),
        }
    }
}

/// Returns the default configuration file path.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("pulselink")
        .join("client.toml")
}
